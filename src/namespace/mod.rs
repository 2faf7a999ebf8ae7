//! Namespace scope tracking and prefix resolution
//!
//! - [`mapping`]: the copy-on-write prefix/URI table
//! - [`stack`]: one [`OutputElement`] frame per open element
//! - [`resolver`]: strict and repairing [`NamespacePolicy`] implementations

pub mod mapping;
pub mod resolver;
pub mod stack;

use indexmap::IndexMap;

use crate::error::{Result, XmlWriteError};
use crate::types::XmlVersion;

pub use mapping::NsMapping;
pub use resolver::{NamespacePolicy, RepairingResolver, Resolved, StrictResolver};
pub use stack::{ElementStack, OutputElement};

/// URI permanently bound to the `xml` prefix
pub const XML_NS_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// URI of namespace declaration attributes; bound to nothing
pub const XMLNS_ATTRIBUTE_NS_URI: &str = "http://www.w3.org/2000/xmlns/";

/// Application-supplied bindings consulted after the writer's own scopes.
///
/// Bindings found here are treated as already declared by an enclosing
/// document, so no declarations are written for them.
pub trait NamespaceContext {
    /// URI bound to `prefix` (`""` asks for the default namespace)
    fn namespace_uri(&self, prefix: &str) -> Option<String>;

    /// A prefix bound to `uri`
    fn prefix(&self, uri: &str) -> Option<String>;
}

/// [`NamespaceContext`] backed by an insertion-ordered map
#[derive(Debug, Clone, Default)]
pub struct SimpleNamespaceContext {
    bindings: IndexMap<String, String>,
}

impl SimpleNamespaceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `prefix` (or the default namespace, for `""`) to `uri`
    pub fn bind(mut self, prefix: &str, uri: &str) -> Self {
        self.bindings.insert(prefix.to_string(), uri.to_string());
        self
    }
}

impl NamespaceContext for SimpleNamespaceContext {
    fn namespace_uri(&self, prefix: &str) -> Option<String> {
        self.bindings.get(prefix).cloned()
    }

    fn prefix(&self, uri: &str) -> Option<String> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, u)| !p.is_empty() && u.as_str() == uri)
            .map(|(p, _)| p.clone())
    }
}

/// Reject bindings XML forbids: `xml` to anything but its URI, `xmlns` at
/// all, either reserved URI under another prefix, and (XML 1.0) a prefix to
/// the empty URI. The empty prefix may take any URI but the reserved ones.
pub fn check_binding(prefix: &str, uri: &str, version: XmlVersion) -> Result<()> {
    let reserved = || XmlWriteError::ReservedBinding {
        prefix: prefix.to_string(),
        uri: uri.to_string(),
    };
    match prefix {
        "xml" if uri == XML_NS_URI => Ok(()),
        "xml" | "xmlns" => Err(reserved()),
        _ if uri == XML_NS_URI || uri == XMLNS_ATTRIBUTE_NS_URI => Err(reserved()),
        "" => Ok(()),
        _ if uri.is_empty() && !version.is_1_1() => {
            Err(XmlWriteError::EmptyUriBinding(prefix.to_string()))
        }
        _ => Ok(()),
    }
}
