//! Open-element frames and the namespace scope they carry

use std::rc::Rc;

use indexmap::IndexSet;

use super::mapping::NsMapping;
use super::{NamespaceContext, XMLNS_ATTRIBUTE_NS_URI, XML_NS_URI};
use crate::config::DEFAULT_POOL_SIZE;
use crate::error::{Result, XmlWriteError};

/// One open element.
///
/// The mapping is shared with the parent until this element binds something
/// of its own.
#[derive(Debug, Default)]
pub struct OutputElement {
    local_name: String,
    prefix: Option<String>,
    uri: String,
    default_ns: String,
    ns: Rc<NsMapping>,
    attrs: IndexSet<(String, String)>,
    declared: Vec<String>,
    attr_prefixes: Vec<String>,
    deferred_check: bool,
}

impl OutputElement {
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Prefix the element is written with; `None` before resolution
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn set_prefix(&mut self, prefix: &str) {
        match &mut self.prefix {
            Some(p) => {
                p.clear();
                p.push_str(prefix);
            }
            None => self.prefix = Some(prefix.to_string()),
        }
    }

    pub fn namespace_uri(&self) -> &str {
        &self.uri
    }

    /// `prefix:local`, or just `local`
    pub fn qualified_name(&self) -> String {
        match self.prefix.as_deref() {
            Some(p) if !p.is_empty() => format!("{p}:{}", self.local_name),
            _ => self.local_name.clone(),
        }
    }

    /// Was a declaration for `prefix` (`""` for the default) written on this element?
    pub fn has_declared(&self, prefix: &str) -> bool {
        self.declared.iter().any(|p| p == prefix)
    }

    /// Record the prefix an attribute of this start tag is written with
    pub fn note_attribute_prefix(&mut self, prefix: &str) {
        if !prefix.is_empty() && !self.attr_prefixes.iter().any(|p| p == prefix) {
            self.attr_prefixes.push(prefix.to_string());
        }
    }

    /// Does the start tag already depend on `prefix`? `""` asks whether the
    /// element itself is in the default namespace.
    pub fn uses_prefix(&self, prefix: &str) -> bool {
        self.prefix.as_deref() == Some(prefix) || self.attr_prefixes.iter().any(|p| p == prefix)
    }

    pub fn is_check_deferred(&self) -> bool {
        self.deferred_check
    }

    pub fn defer_check(&mut self, deferred: bool) {
        self.deferred_check = deferred;
    }

    #[cfg(test)]
    pub(crate) fn attribute_count(&self) -> usize {
        self.attrs.len()
    }

    fn reset(&mut self, local_name: &str, prefix: Option<&str>, uri: &str) {
        self.local_name.clear();
        self.local_name.push_str(local_name);
        match prefix {
            Some(p) => self.set_prefix(p),
            None => self.prefix = None,
        }
        self.uri.clear();
        self.uri.push_str(uri);
        self.attrs.clear();
        self.declared.clear();
        self.attr_prefixes.clear();
        self.deferred_check = false;
    }
}

/// Stack of open elements plus the document-level scope below them.
pub struct ElementStack {
    frames: Vec<OutputElement>,
    pool: Vec<OutputElement>,
    pool_size: usize,
    root_ns: Rc<NsMapping>,
    root_default: String,
    context: Option<Box<dyn NamespaceContext>>,
}

impl Default for ElementStack {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

impl ElementStack {
    pub fn new(pool_size: usize) -> Self {
        ElementStack {
            frames: Vec::new(),
            pool: Vec::with_capacity(pool_size),
            pool_size,
            root_ns: Rc::new(NsMapping::new()),
            root_default: String::new(),
            context: None,
        }
    }

    /// Bindings assumed to be declared by an enclosing document
    pub fn set_root_context(&mut self, ctx: Box<dyn NamespaceContext>) {
        if let Some(uri) = ctx.namespace_uri("") {
            self.root_default = uri;
        }
        self.context = Some(ctx);
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn current(&self) -> Option<&OutputElement> {
        self.frames.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut OutputElement> {
        self.frames.last_mut()
    }

    /// Open a frame that inherits the current scope
    pub fn push(&mut self, local_name: &str, prefix: Option<&str>, uri: &str) -> &mut OutputElement {
        let (ns, default_ns) = match self.frames.last() {
            Some(parent) => (Rc::clone(&parent.ns), parent.default_ns.as_str()),
            None => (Rc::clone(&self.root_ns), self.root_default.as_str()),
        };
        let default_ns = default_ns.to_string();

        let mut frame = self.pool.pop().unwrap_or_default();
        frame.reset(local_name, prefix, uri);
        frame.ns = ns;
        frame.default_ns = default_ns;

        self.frames.push(frame);
        let depth = self.frames.len();
        &mut self.frames[depth - 1]
    }

    pub fn pop(&mut self) -> Option<OutputElement> {
        self.frames.pop()
    }

    /// Hand a popped frame back for reuse
    pub fn release(&mut self, mut frame: OutputElement) {
        if self.pool.len() < self.pool_size {
            // Drop the mapping now so the parent's copy stays unshared
            frame.ns = Rc::default();
            self.pool.push(frame);
        }
    }

    /// Drop every open frame and the pool
    pub fn clear(&mut self) {
        self.frames.clear();
        self.pool = Vec::new();
    }

    /// URI bound to `prefix` in the current scope
    pub fn lookup_uri(&self, prefix: &str) -> Option<String> {
        match prefix {
            "" => {
                let uri = self.default_uri();
                return (!uri.is_empty()).then(|| uri.to_string());
            }
            "xml" => return Some(XML_NS_URI.to_string()),
            "xmlns" => return Some(XMLNS_ATTRIBUTE_NS_URI.to_string()),
            _ => {}
        }
        let mapping = self.mapping();
        if let Some(uri) = mapping.find_uri(prefix) {
            return Some(uri.to_string());
        }
        if mapping.mentions(prefix) {
            return None;
        }
        self.context
            .as_ref()
            .and_then(|ctx| ctx.namespace_uri(prefix))
            .filter(|uri| !uri.is_empty())
    }

    /// A non-empty prefix bound to `uri` in the current scope
    pub fn lookup_prefix(&self, uri: &str) -> Option<String> {
        if uri == XML_NS_URI {
            return Some("xml".to_string());
        }
        let mapping = self.mapping();
        if let Some(prefix) = mapping.find_prefix(uri) {
            return Some(prefix.to_string());
        }
        self.context
            .as_ref()
            .and_then(|ctx| ctx.prefix(uri))
            .filter(|p| !p.is_empty() && !mapping.mentions(p))
    }

    /// Is `prefix` taken anywhere in scope, including masked bindings?
    pub fn is_prefix_taken(&self, prefix: &str) -> bool {
        self.mapping().mentions(prefix) || self.lookup_uri(prefix).is_some()
    }

    /// Bind `prefix` in the innermost scope, cloning a shared mapping first
    pub fn add_binding(&mut self, prefix: &str, uri: &str) {
        let ns = match self.frames.last_mut() {
            Some(frame) => &mut frame.ns,
            None => &mut self.root_ns,
        };
        Rc::make_mut(ns).bind(prefix, uri);
    }

    pub fn default_uri(&self) -> &str {
        match self.frames.last() {
            Some(frame) => &frame.default_ns,
            None => &self.root_default,
        }
    }

    pub fn set_default_uri(&mut self, uri: &str) {
        let target = match self.frames.last_mut() {
            Some(frame) => &mut frame.default_ns,
            None => &mut self.root_default,
        };
        target.clear();
        target.push_str(uri);
    }

    /// Note that a declaration for `prefix` was written on the current element
    pub fn mark_declared(&mut self, prefix: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.declared.push(prefix.to_string());
        }
    }

    /// Register an attribute of the open start tag; rejects duplicates
    pub fn add_attribute(&mut self, uri: &str, local_name: &str) -> Result<()> {
        let Some(frame) = self.frames.last_mut() else {
            return Err(XmlWriteError::NoOpenStartTag("an attribute"));
        };
        if !frame
            .attrs
            .insert((uri.to_string(), local_name.to_string()))
        {
            return Err(XmlWriteError::DuplicateAttribute {
                uri: uri.to_string(),
                local: local_name.to_string(),
            });
        }
        Ok(())
    }

    fn mapping(&self) -> &NsMapping {
        match self.frames.last() {
            Some(frame) => &frame.ns,
            None => &self.root_ns,
        }
    }

    #[cfg(test)]
    fn pooled(&self) -> usize {
        self.pool.len()
    }
}
