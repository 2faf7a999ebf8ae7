//! Prefix resolution for elements and attributes
//!
//! [`StrictResolver`] only checks what the caller asked for and never writes
//! a declaration on its own. [`RepairingResolver`] binds and declares
//! whatever is needed so any (URI, local name) pair can be written.

use indexmap::IndexMap;

use super::stack::ElementStack;
use super::{check_binding, XMLNS_ATTRIBUTE_NS_URI, XML_NS_URI};
use crate::error::{Result, XmlWriteError};
use crate::types::XmlVersion;

/// Outcome of resolving an element or attribute name
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolved {
    /// Prefix to write; empty for none
    pub prefix: String,
    /// Declaration `(prefix, uri)` to write along with the name
    pub declaration: Option<(String, String)>,
}

impl Resolved {
    fn existing(prefix: impl Into<String>) -> Self {
        Resolved {
            prefix: prefix.into(),
            declaration: None,
        }
    }

    fn declared(prefix: &str, uri: &str) -> Self {
        Resolved {
            prefix: prefix.to_string(),
            declaration: Some((prefix.to_string(), uri.to_string())),
        }
    }
}

/// How prefixes are chosen and bindings made.
///
/// Element resolution runs after the element's frame was pushed, so any
/// binding it makes lands in the new element's scope.
pub trait NamespacePolicy {
    fn resolve_element(
        &mut self,
        stack: &mut ElementStack,
        prefix: Option<&str>,
        uri: &str,
        version: XmlVersion,
    ) -> Result<Resolved>;

    fn resolve_attribute(
        &mut self,
        stack: &mut ElementStack,
        prefix: Option<&str>,
        uri: &str,
        version: XmlVersion,
    ) -> Result<Resolved>;

    /// Bind `prefix` on the open element; `Ok(true)` if the declaration
    /// should be written
    fn declare_namespace(
        &mut self,
        stack: &mut ElementStack,
        prefix: &str,
        uri: &str,
        version: XmlVersion,
    ) -> Result<bool>;

    /// Same as [`declare_namespace`](Self::declare_namespace) for the default namespace
    fn declare_default(&mut self, stack: &mut ElementStack, uri: &str) -> Result<bool>;

    /// Associate `prefix` with `uri` without writing a declaration
    fn set_prefix(
        &mut self,
        stack: &mut ElementStack,
        prefix: &str,
        uri: &str,
        version: XmlVersion,
    ) -> Result<()>;

    fn set_default_namespace(&mut self, stack: &mut ElementStack, uri: &str) -> Result<()>;

    /// Checks that had to wait until every declaration of the start tag was seen
    fn verify_start_tag(&self, stack: &ElementStack) -> Result<()>;

    fn is_repairing(&self) -> bool;
}

fn unbound(prefix: Option<&str>, uri: &str) -> XmlWriteError {
    XmlWriteError::UnboundNamespace {
        prefix: prefix.map(str::to_string),
        uri: uri.to_string(),
    }
}

fn reject_reserved_uri(prefix: &str, uri: &str) -> Result<()> {
    if uri == XMLNS_ATTRIBUTE_NS_URI || (uri == XML_NS_URI && prefix != "xml") {
        return Err(XmlWriteError::ReservedBinding {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        });
    }
    Ok(())
}

/// Validates caller-supplied prefixes against the bindings in scope
#[derive(Debug, Default)]
pub struct StrictResolver;

impl StrictResolver {
    pub fn new() -> Self {
        StrictResolver
    }
}

impl NamespacePolicy for StrictResolver {
    fn resolve_element(
        &mut self,
        stack: &mut ElementStack,
        prefix: Option<&str>,
        uri: &str,
        _version: XmlVersion,
    ) -> Result<Resolved> {
        let chosen = match prefix {
            Some(p) => {
                if p == "xml" || p == "xmlns" {
                    check_binding(p, uri, XmlVersion::V1_1)?;
                }
                let consistent = if p.is_empty() {
                    stack.default_uri() == uri
                } else {
                    stack.lookup_uri(p).as_deref() == Some(uri)
                };
                if let Some(frame) = stack.current_mut() {
                    frame.defer_check(!consistent);
                }
                p.to_string()
            }
            None if stack.default_uri() == uri => String::new(),
            None if uri.is_empty() => {
                // Needs an xmlns="" declaration before the tag closes
                if let Some(frame) = stack.current_mut() {
                    frame.defer_check(true);
                }
                String::new()
            }
            None => stack
                .lookup_prefix(uri)
                .ok_or_else(|| unbound(None, uri))?,
        };
        Ok(Resolved::existing(chosen))
    }

    fn resolve_attribute(
        &mut self,
        stack: &mut ElementStack,
        prefix: Option<&str>,
        uri: &str,
        _version: XmlVersion,
    ) -> Result<Resolved> {
        match prefix {
            Some(p) if !p.is_empty() => match stack.lookup_uri(p) {
                Some(bound) if bound == uri => Ok(Resolved::existing(p)),
                Some(bound) => Err(XmlWriteError::MismatchedBinding {
                    prefix: p.to_string(),
                    bound,
                    requested: uri.to_string(),
                }),
                None => Err(unbound(Some(p), uri)),
            },
            _ if uri.is_empty() => Ok(Resolved::existing("")),
            _ => stack
                .lookup_prefix(uri)
                .map(Resolved::existing)
                .ok_or_else(|| unbound(None, uri)),
        }
    }

    fn declare_namespace(
        &mut self,
        stack: &mut ElementStack,
        prefix: &str,
        uri: &str,
        version: XmlVersion,
    ) -> Result<bool> {
        if prefix.is_empty() {
            return self.declare_default(stack, uri);
        }
        check_binding(prefix, uri, version)?;
        stack.add_binding(prefix, uri);
        stack.mark_declared(prefix);
        Ok(true)
    }

    fn declare_default(&mut self, stack: &mut ElementStack, uri: &str) -> Result<bool> {
        check_binding("", uri, XmlVersion::V1_0)?;
        stack.set_default_uri(uri);
        stack.mark_declared("");
        Ok(true)
    }

    fn set_prefix(
        &mut self,
        stack: &mut ElementStack,
        prefix: &str,
        uri: &str,
        version: XmlVersion,
    ) -> Result<()> {
        check_binding(prefix, uri, version)?;
        if prefix.is_empty() {
            stack.set_default_uri(uri);
        } else {
            stack.add_binding(prefix, uri);
        }
        Ok(())
    }

    fn set_default_namespace(&mut self, stack: &mut ElementStack, uri: &str) -> Result<()> {
        check_binding("", uri, XmlVersion::V1_0)?;
        stack.set_default_uri(uri);
        Ok(())
    }

    fn verify_start_tag(&self, stack: &ElementStack) -> Result<()> {
        let Some(frame) = stack.current() else {
            return Ok(());
        };
        if !frame.is_check_deferred() {
            return Ok(());
        }
        let prefix = frame.prefix().unwrap_or("");
        let uri = frame.namespace_uri();
        match stack.lookup_uri(prefix) {
            Some(bound) if bound == uri => Ok(()),
            None if prefix.is_empty() && uri.is_empty() => Ok(()),
            Some(bound) => Err(XmlWriteError::MismatchedBinding {
                prefix: prefix.to_string(),
                bound,
                requested: uri.to_string(),
            }),
            None => Err(unbound(Some(prefix), uri)),
        }
    }

    fn is_repairing(&self) -> bool {
        false
    }
}

/// Invents and declares prefixes as needed.
///
/// Generated prefixes are `<base><n>` with `n` taken from a counter that
/// only grows, skipping any prefix already visible.
#[derive(Debug)]
pub struct RepairingResolver {
    suggested_prefixes: IndexMap<String, String>,
    suggested_default: Option<String>,
    auto_prefix: String,
    counter: u32,
}

impl Default for RepairingResolver {
    fn default() -> Self {
        Self::new("ns")
    }
}

impl RepairingResolver {
    pub fn new(auto_prefix: &str) -> Self {
        RepairingResolver {
            suggested_prefixes: IndexMap::new(),
            suggested_default: None,
            auto_prefix: auto_prefix.to_string(),
            counter: 0,
        }
    }

    fn generate_prefix(&mut self, stack: &ElementStack) -> String {
        let mut buf = itoa::Buffer::new();
        loop {
            self.counter += 1;
            let candidate = format!("{}{}", self.auto_prefix, buf.format(self.counter));
            if !stack.is_prefix_taken(&candidate) {
                log::trace!(target: "xmlstream::ns", "generated prefix {candidate}");
                return candidate;
            }
        }
    }

    /// Bind `prefix` in the current frame and report the declaration
    fn bind(stack: &mut ElementStack, prefix: &str, uri: &str) -> Resolved {
        log::debug!(target: "xmlstream::ns", "binding {prefix:?} -> {uri:?}");
        if prefix.is_empty() {
            stack.set_default_uri(uri);
        } else {
            stack.add_binding(prefix, uri);
        }
        stack.mark_declared(prefix);
        Resolved::declared(prefix, uri)
    }

    /// Hinted prefix for `uri`, if it can be bound here without masking
    fn usable_hint(&self, stack: &ElementStack, uri: &str) -> Option<String> {
        self.suggested_prefixes
            .get(uri)
            .filter(|p| !p.is_empty() && stack.lookup_uri(p).is_none())
            .cloned()
    }
}

impl NamespacePolicy for RepairingResolver {
    fn resolve_element(
        &mut self,
        stack: &mut ElementStack,
        prefix: Option<&str>,
        uri: &str,
        version: XmlVersion,
    ) -> Result<Resolved> {
        if uri == XML_NS_URI {
            return Ok(Resolved::existing("xml"));
        }
        reject_reserved_uri(prefix.unwrap_or(""), uri)?;

        if let Some(p) = prefix {
            if p.is_empty() {
                if stack.default_uri() == uri {
                    return Ok(Resolved::existing(""));
                }
                return Ok(Self::bind(stack, "", uri));
            }
            if !uri.is_empty() && check_binding(p, uri, version).is_ok() {
                if stack.lookup_uri(p).as_deref() == Some(uri) {
                    return Ok(Resolved::existing(p));
                }
                return Ok(Self::bind(stack, p, uri));
            }
            log::debug!(target: "xmlstream::ns", "ignoring unusable prefix {p:?} for {uri:?}");
        }

        if uri.is_empty() {
            if stack.default_uri().is_empty() {
                return Ok(Resolved::existing(""));
            }
            return Ok(Self::bind(stack, "", ""));
        }

        if stack.default_uri() == uri {
            return Ok(Resolved::existing(""));
        }
        if let Some(existing) = stack.lookup_prefix(uri) {
            return Ok(Resolved::existing(existing));
        }
        if self.suggested_default.as_deref() == Some(uri) {
            return Ok(Self::bind(stack, "", uri));
        }

        let chosen = match self.suggested_prefixes.get(uri) {
            Some(hint) if !hint.is_empty() => hint.clone(),
            _ => self.generate_prefix(stack),
        };
        Ok(Self::bind(stack, &chosen, uri))
    }

    fn resolve_attribute(
        &mut self,
        stack: &mut ElementStack,
        prefix: Option<&str>,
        uri: &str,
        version: XmlVersion,
    ) -> Result<Resolved> {
        if uri.is_empty() {
            return Ok(Resolved::existing(""));
        }
        if uri == XML_NS_URI {
            return Ok(Resolved::existing("xml"));
        }
        reject_reserved_uri(prefix.unwrap_or(""), uri)?;

        if let Some(p) = prefix.filter(|p| !p.is_empty()) {
            if check_binding(p, uri, version).is_ok() {
                match stack.lookup_uri(p) {
                    Some(bound) if bound == uri => return Ok(Resolved::existing(p)),
                    None => return Ok(Self::bind(stack, p, uri)),
                    Some(_) => {}
                }
            }
        }

        if let Some(existing) = stack.lookup_prefix(uri) {
            return Ok(Resolved::existing(existing));
        }

        let chosen = match self.usable_hint(stack, uri) {
            Some(hint) => hint,
            None => self.generate_prefix(stack),
        };
        Ok(Self::bind(stack, &chosen, uri))
    }

    fn declare_namespace(
        &mut self,
        stack: &mut ElementStack,
        prefix: &str,
        uri: &str,
        version: XmlVersion,
    ) -> Result<bool> {
        if prefix.is_empty() {
            return self.declare_default(stack, uri);
        }
        check_binding(prefix, uri, version)?;
        if stack.lookup_uri(prefix).as_deref() == Some(uri) {
            log::trace!(target: "xmlstream::ns", "{prefix:?} already bound in scope");
            return Ok(false);
        }
        if stack.current().is_some_and(|f| f.uses_prefix(prefix)) {
            log::debug!(
                target: "xmlstream::ns",
                "skipping xmlns:{prefix}={uri:?}: the start tag is already written with {prefix:?}"
            );
            return Ok(false);
        }
        if stack.current().is_some_and(|f| f.has_declared(prefix)) {
            log::debug!(
                target: "xmlstream::ns",
                "skipping xmlns:{prefix}={uri:?}: conflicts with this element's own declaration"
            );
            return Ok(false);
        }
        stack.add_binding(prefix, uri);
        stack.mark_declared(prefix);
        Ok(true)
    }

    fn declare_default(&mut self, stack: &mut ElementStack, uri: &str) -> Result<bool> {
        check_binding("", uri, XmlVersion::V1_0)?;
        if stack.default_uri() == uri {
            return Ok(false);
        }
        if stack.current().is_some_and(|f| f.uses_prefix("")) {
            log::debug!(
                target: "xmlstream::ns",
                "skipping xmlns={uri:?}: the element is already in the default namespace"
            );
            return Ok(false);
        }
        if stack.current().is_some_and(|f| f.has_declared("")) {
            log::debug!(
                target: "xmlstream::ns",
                "skipping xmlns={uri:?}: conflicts with this element's own declaration"
            );
            return Ok(false);
        }
        stack.set_default_uri(uri);
        stack.mark_declared("");
        Ok(true)
    }

    fn set_prefix(
        &mut self,
        _stack: &mut ElementStack,
        prefix: &str,
        uri: &str,
        version: XmlVersion,
    ) -> Result<()> {
        check_binding(prefix, uri, version)?;
        if prefix.is_empty() {
            self.suggested_default = Some(uri.to_string());
        } else {
            self.suggested_prefixes
                .insert(uri.to_string(), prefix.to_string());
        }
        Ok(())
    }

    fn set_default_namespace(&mut self, _stack: &mut ElementStack, uri: &str) -> Result<()> {
        check_binding("", uri, XmlVersion::V1_0)?;
        self.suggested_default = Some(uri.to_string());
        Ok(())
    }

    fn verify_start_tag(&self, _stack: &ElementStack) -> Result<()> {
        Ok(())
    }

    fn is_repairing(&self) -> bool {
        true
    }
}
