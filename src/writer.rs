//! Namespace-aware streaming XML writer
//!
//! [`StreamWriter`] sequences structural calls into a well-formed document:
//! it keeps the prolog/tree/epilog state, closes pending start tags, asks
//! the namespace policy for prefixes and hands escaped content to the
//! buffered output.
//!
//! Any error leaves the writer unusable. Buffered output is flushed first
//! (best effort) so the sink shows how far the document got; every later
//! call returns [`XmlWriteError::Closed`].

use std::fmt;
use std::io;

use crate::config::WriterConfig;
use crate::error::{Result, XmlWriteError};
use crate::fast_writer::{CharWriter, Encoding, XmlOutput, XmlWriter};
use crate::names;
use crate::namespace::{
    ElementStack, NamespaceContext, NamespacePolicy, RepairingResolver, StrictResolver,
    XMLNS_ATTRIBUTE_NS_URI,
};
use crate::types::{is_xml_whitespace, ContentClass, DocumentState, XmlVersion};
use crate::validation::{
    Escaper, LogReporter, ProblemReporter, ValidationProblem, ValidationResult, Validator,
};

/// Attribute key under which a default namespace declaration is registered
const DEFAULT_DECL_KEY: &str = "xmlns";

/// Streaming XML writer with namespace support
///
/// # Examples
///
/// ```
/// use xmlstream::{StreamWriter, WriterConfig};
///
/// let mut writer = StreamWriter::new(Vec::new(), WriterConfig::repairing());
/// writer.write_start_element(None, "feed", "http://www.w3.org/2005/Atom").unwrap();
/// writer.write_start_element(None, "title", "http://www.w3.org/2005/Atom").unwrap();
/// writer.write_characters("Fish & Chips").unwrap();
/// writer.write_end_document().unwrap();
///
/// let xml = String::from_utf8(writer.into_inner().unwrap()).unwrap();
/// assert_eq!(
///     xml,
///     "<ns1:feed xmlns:ns1=\"http://www.w3.org/2005/Atom\">\
///      <ns1:title>Fish &amp; Chips</ns1:title></ns1:feed>"
/// );
/// ```
pub struct StreamWriter<O: XmlOutput> {
    out: O,
    config: WriterConfig,
    version: XmlVersion,
    state: DocumentState,
    stack: ElementStack,
    policy: Box<dyn NamespacePolicy>,
    validator: Option<Box<dyn Validator>>,
    reporter: Box<dyn ProblemReporter>,
    escaper: Option<Box<dyn Escaper>>,
    /// Allowed content of the innermost open element
    content: ContentClass,
    start_tag_open: bool,
    empty_element: bool,
    started: bool,
    has_doctype: bool,
    doctype_root: Option<String>,
    failed: bool,
    closed: bool,
}

impl<W: io::Write> StreamWriter<XmlWriter<W>> {
    /// Writer producing UTF-8 bytes
    pub fn new(sink: W, config: WriterConfig) -> Self {
        Self::with_encoding(sink, "UTF-8", config)
    }

    /// Writer producing bytes in the charset named by `label`.
    ///
    /// UTF-8, US-ASCII and ISO-8859-1 are transcoded; other labels get UTF-8
    /// bytes and a logged warning.
    pub fn with_encoding(sink: W, label: &str, config: WriterConfig) -> Self {
        let out = XmlWriter::with_config(sink, Encoding::from_label(label), &config);
        Self::from_output(out, config)
    }

    /// Flush and return the sink
    pub fn into_inner(self) -> Result<W> {
        self.out.into_inner()
    }
}

impl<W: fmt::Write> StreamWriter<CharWriter<W>> {
    /// Writer producing characters, e.g. into a `String`
    pub fn for_fmt(sink: W, config: WriterConfig) -> Self {
        let out = CharWriter::with_config(sink, &config);
        Self::from_output(out, config)
    }

    /// Flush and return the sink
    pub fn into_inner(self) -> Result<W> {
        self.out.into_inner()
    }
}

impl<O: XmlOutput> StreamWriter<O> {
    /// Wrap an already configured output
    pub fn from_output(out: O, config: WriterConfig) -> Self {
        let policy: Box<dyn NamespacePolicy> = if config.repairing {
            Box::new(RepairingResolver::new(&config.auto_prefix))
        } else {
            Box::new(StrictResolver::new())
        };
        StreamWriter {
            out,
            version: config.xml_version,
            stack: ElementStack::new(config.pool_size),
            config,
            state: DocumentState::Prolog,
            policy,
            validator: None,
            reporter: Box::new(LogReporter),
            escaper: None,
            content: ContentClass::Any,
            start_tag_open: false,
            empty_element: false,
            started: false,
            has_doctype: false,
            doctype_root: None,
            failed: false,
            closed: false,
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    /// Number of open elements
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn is_repairing(&self) -> bool {
        self.policy.is_repairing()
    }

    /// Has the writer been closed or stopped by an error?
    pub fn is_closed(&self) -> bool {
        self.closed || self.failed
    }

    pub fn output(&self) -> &O {
        &self.out
    }

    /// Prefix bound to `uri` in the current scope; `""` for the default namespace
    pub fn prefix_for(&self, uri: &str) -> Option<String> {
        if !uri.is_empty() && self.stack.default_uri() == uri {
            return Some(String::new());
        }
        self.stack.lookup_prefix(uri)
    }

    /// URI bound to `prefix` in the current scope (`""` asks for the default)
    pub fn namespace_uri_for(&self, prefix: &str) -> Option<String> {
        self.stack.lookup_uri(prefix)
    }

    pub fn set_validator(&mut self, validator: Box<dyn Validator>) {
        self.validator = Some(validator);
    }

    pub fn set_problem_reporter(&mut self, reporter: Box<dyn ProblemReporter>) {
        self.reporter = reporter;
    }

    pub fn set_escaper(&mut self, escaper: Box<dyn Escaper>) {
        self.escaper = Some(escaper);
    }

    /// Bindings of an enclosing document. Only allowed before the root element.
    pub fn set_namespace_context(&mut self, ctx: Box<dyn NamespaceContext>) -> Result<()> {
        self.run(|w| {
            if w.state != DocumentState::Prolog || !w.stack.is_empty() {
                return Err(XmlWriteError::NotInProlog("a namespace context"));
            }
            w.stack.set_root_context(ctx);
            Ok(())
        })
    }

    /// Write the XML declaration. Must come first.
    pub fn write_start_document(
        &mut self,
        version: XmlVersion,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            if w.config.check_structure && w.started {
                return Err(XmlWriteError::NotInProlog("the XML declaration"));
            }
            if let Some(label) = encoding {
                if Encoding::from_label(label) != *w.out.encoding() {
                    log::warn!(
                        target: "xmlstream::writer",
                        "declared encoding {label} differs from output encoding {}",
                        w.out.encoding()
                    );
                }
            }
            w.version = version;
            w.out.settings_mut().xml_version = version;
            w.started = true;
            w.out.write_xml_declaration(version, encoding, standalone)
        })
    }

    /// Write a complete DOCTYPE declaration verbatim
    pub fn write_dtd(&mut self, dtd: &str) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            w.check_doctype_allowed()?;
            w.doctype_root = doctype_root_name(dtd);
            w.has_doctype = true;
            w.started = true;
            w.out.write_raw(dtd)
        })
    }

    /// Write `<!DOCTYPE root ...>`. With structural checks on, the root
    /// element must then carry this name.
    pub fn write_doctype(
        &mut self,
        root: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
        internal_subset: Option<&str>,
    ) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            w.check_doctype_allowed()?;
            if w.config.check_names && !names::is_name(root) {
                return Err(XmlWriteError::InvalidName {
                    kind: "DOCTYPE root",
                    name: root.to_string(),
                });
            }
            w.doctype_root = Some(root.to_string());
            w.has_doctype = true;
            w.started = true;
            w.out
                .write_doctype(root, public_id, system_id, internal_subset)
        })
    }

    /// Open an element. `prefix` is a suggestion in repairing mode and a
    /// requirement otherwise; `None` lets the writer pick.
    pub fn write_start_element(&mut self, prefix: Option<&str>, local: &str, uri: &str) -> Result<()> {
        self.run(|w| w.start_element(prefix, local, uri, false))
    }

    /// Write an element that will have no content. It is closed with `/>`
    /// by whatever call comes next; attributes may still be added.
    pub fn write_empty_element(&mut self, prefix: Option<&str>, local: &str, uri: &str) -> Result<()> {
        self.run(|w| w.start_element(prefix, local, uri, true))
    }

    /// Add an attribute to the open start tag
    pub fn write_attribute(
        &mut self,
        prefix: Option<&str>,
        uri: &str,
        local: &str,
        value: &str,
    ) -> Result<()> {
        self.run(|w| w.attribute(prefix, uri, local, value))
    }

    /// Declare `prefix` on the open start tag (`""` declares the default namespace)
    pub fn write_namespace(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            if prefix.is_empty() {
                return w.default_namespace(uri);
            }
            if !w.start_tag_open {
                return Err(XmlWriteError::NoOpenStartTag("a namespace declaration"));
            }
            if w.config.check_names {
                names::check_prefix(prefix)?;
            }
            if w.policy.declare_namespace(&mut w.stack, prefix, uri, w.version)? {
                if w.config.check_attributes {
                    w.stack.add_attribute(XMLNS_ATTRIBUTE_NS_URI, prefix)?;
                }
                w.out.write_namespace_decl(prefix, uri)?;
            }
            Ok(())
        })
    }

    pub fn write_default_namespace(&mut self, uri: &str) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            w.default_namespace(uri)
        })
    }

    /// Bind `prefix` without writing a declaration. In repairing mode this
    /// only records a preference for `uri`.
    pub fn set_prefix(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            w.policy.set_prefix(&mut w.stack, prefix, uri, w.version)
        })
    }

    pub fn set_default_namespace(&mut self, uri: &str) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            w.policy.set_default_namespace(&mut w.stack, uri)
        })
    }

    pub fn write_characters(&mut self, text: &str) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            w.text(text)
        })
    }

    /// Write UTF-16 text. A high surrogate ending `units` is held until the
    /// next call, which must start with the matching low surrogate.
    pub fn write_characters_utf16(&mut self, units: &[u16]) -> Result<()> {
        self.run(|w| {
            let mut decoded = String::with_capacity(units.len());
            crate::fast_writer::encoding::decode_utf16_chunk(
                w.out.pending_surrogate(),
                units,
                &mut decoded,
            )?;
            w.text(&decoded)
        })
    }

    pub fn write_cdata(&mut self, data: &str) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            w.close_open_start()?;
            w.check_in_root("CDATA")?;
            w.check_text_allowed(is_xml_whitespace(data))?;
            w.validate_text(data)?;
            w.started = true;
            match w.out.write_cdata(data)? {
                Some(offset) => Err(XmlWriteError::IllegalSequence {
                    construct: "CDATA section",
                    offset,
                }),
                None => Ok(()),
            }
        })
    }

    pub fn write_comment(&mut self, data: &str) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            w.close_open_start()?;
            w.check_markup_allowed("comment")?;
            w.started = true;
            match w.out.write_comment(data)? {
                Some(offset) => Err(XmlWriteError::IllegalSequence {
                    construct: "comment",
                    offset,
                }),
                None => Ok(()),
            }
        })
    }

    pub fn write_processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            names::check_pi_target(target)?;
            w.close_open_start()?;
            w.check_markup_allowed("processing instruction")?;
            w.started = true;
            match w.out.write_pi(target, data)? {
                Some(offset) => Err(XmlWriteError::IllegalSequence {
                    construct: "processing instruction",
                    offset,
                }),
                None => Ok(()),
            }
        })
    }

    /// Write `&name;`
    pub fn write_entity_ref(&mut self, name: &str) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            if w.config.check_names {
                names::check_entity_name(name)?;
            }
            w.close_open_start()?;
            w.check_in_root("entity reference")?;
            w.check_text_allowed(false)?;
            w.started = true;
            w.out.write_entity_ref(name)
        })
    }

    /// Write markup as-is. Only encodability is checked.
    pub fn write_raw(&mut self, text: &str) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            w.close_open_start()?;
            w.started = true;
            w.out.write_raw(text)
        })
    }

    /// Close the innermost element
    pub fn write_end_element(&mut self) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            w.end_pending_empty()?;
            if w.stack.is_empty() {
                return Err(XmlWriteError::NoOpenElement);
            }
            w.end_element()
        })
    }

    /// Close the innermost element, checking that it is `{uri}local`
    pub fn write_end_element_named(&mut self, uri: &str, local: &str) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            w.end_pending_empty()?;
            let Some(frame) = w.stack.current() else {
                return Err(XmlWriteError::NoOpenElement);
            };
            if w.config.check_structure
                && (frame.local_name() != local || frame.namespace_uri() != uri)
            {
                let found = if uri.is_empty() {
                    local.to_string()
                } else {
                    format!("{{{uri}}}{local}")
                };
                return Err(XmlWriteError::MismatchedEndTag {
                    expected: frame.qualified_name(),
                    found,
                });
            }
            w.end_element()
        })
    }

    /// Close any open elements and flush.
    ///
    /// Fails with [`XmlWriteError::EmptyDocument`] under structural checking
    /// if no root element was ever written.
    pub fn write_end_document(&mut self) -> Result<()> {
        self.run(|w| {
            w.check_surrogate()?;
            w.close_all()?;
            if w.config.check_structure && w.state == DocumentState::Prolog {
                return Err(XmlWriteError::EmptyDocument);
            }
            w.out.flush_buffer()
        })
    }

    /// Flush buffered output and the sink
    pub fn flush(&mut self) -> Result<()> {
        self.run(|w| w.out.flush())
    }

    /// Close open elements, flush, and release buffers. The sink is dropped
    /// if `auto_close_output` is set. Closing twice is a no-op, and closing a
    /// writer stopped by an error only releases its resources.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.failed {
            self.release();
            return Ok(());
        }
        let result = self.close_all().and_then(|_| {
            self.out.close(self.config.auto_close_output)
        });
        if let Err(err) = &result {
            log::debug!(target: "xmlstream::writer", "close failed: {err}");
            let _ = self.out.flush_buffer();
        }
        self.release();
        result
    }

    fn release(&mut self) {
        self.out.release(self.config.auto_close_output);
        self.stack.clear();
        self.closed = true;
        log::debug!(target: "xmlstream::writer", "writer closed");
    }

    /// Run one operation; any error makes the writer terminal
    fn run<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.failed || self.closed {
            return Err(XmlWriteError::Closed);
        }
        let result = op(self);
        if let Err(err) = &result {
            log::debug!(
                target: "xmlstream::writer",
                "fatal error in {} state at depth {}: {err}",
                self.state,
                self.stack.depth()
            );
            // Best effort: show how far the document got
            let _ = self.out.flush_buffer();
            self.failed = true;
        }
        result
    }

    fn check_surrogate(&mut self) -> Result<()> {
        match *self.out.pending_surrogate() {
            Some(high) => Err(XmlWriteError::UnpairedSurrogate(high)),
            None => Ok(()),
        }
    }

    fn check_doctype_allowed(&self) -> Result<()> {
        if self.config.check_structure
            && (self.state != DocumentState::Prolog || self.has_doctype)
        {
            return Err(XmlWriteError::NotInProlog("DOCTYPE"));
        }
        Ok(())
    }

    /// Text-like content outside the root element
    fn check_in_root(&self, what: &'static str) -> Result<()> {
        if self.config.check_structure && self.stack.is_empty() {
            return Err(XmlWriteError::OutsideRoot(what));
        }
        Ok(())
    }

    fn check_text_allowed(&self, whitespace_only: bool) -> Result<()> {
        if !self.stack.is_empty() && !self.content.allows_text(whitespace_only) {
            return Err(self.content_violation("text"));
        }
        Ok(())
    }

    fn check_markup_allowed(&self, what: &str) -> Result<()> {
        if !self.stack.is_empty() && self.content == ContentClass::Empty {
            return Err(self.content_violation(what));
        }
        Ok(())
    }

    fn content_violation(&self, what: &str) -> XmlWriteError {
        let element = self
            .stack
            .current()
            .map(|f| f.qualified_name())
            .unwrap_or_default();
        XmlWriteError::Validation(ValidationProblem::error(format!(
            "{what} not allowed in <{element}> ({:?} content)",
            self.content
        )))
    }

    fn validate_text(&mut self, text: &str) -> Result<()> {
        if let Some(v) = self.validator.as_mut() {
            validated(self.reporter.as_mut(), v.validate_text(text, true))?;
        }
        Ok(())
    }

    fn start_element(&mut self, prefix: Option<&str>, local: &str, uri: &str, empty: bool) -> Result<()> {
        self.check_surrogate()?;
        self.close_open_start()?;
        if self.config.check_names {
            names::check_ncname(local, "element")?;
            if let Some(p) = prefix {
                names::check_prefix(p)?;
            }
        }

        let entering_root = self.stack.is_empty();
        if entering_root {
            match self.state {
                DocumentState::Epilog if self.config.check_structure => {
                    return Err(XmlWriteError::SecondRoot(local.to_string()));
                }
                DocumentState::Tree => {}
                _ => {
                    log::debug!(target: "xmlstream::writer", "{} -> tree", self.state);
                    self.state = DocumentState::Tree;
                }
            }
        } else if !self.content.allows_elements() {
            return Err(self.content_violation("element"));
        }

        self.stack.push(local, prefix, uri);
        let resolved = self
            .policy
            .resolve_element(&mut self.stack, prefix, uri, self.version)?;
        if let Some(frame) = self.stack.current_mut() {
            frame.set_prefix(&resolved.prefix);
        }

        if entering_root && self.config.check_structure {
            if let (Some(expected), Some(frame)) = (&self.doctype_root, self.stack.current()) {
                let found = frame.qualified_name();
                if *expected != found {
                    return Err(XmlWriteError::RootElementMismatch {
                        expected: expected.clone(),
                        found,
                    });
                }
            }
        }

        if let Some(v) = self.validator.as_mut() {
            validated(
                self.reporter.as_mut(),
                v.validate_element_start(local, uri, &resolved.prefix),
            )?;
        }

        self.out.write_start_tag(&resolved.prefix, local)?;
        if let Some((decl_prefix, decl_uri)) = &resolved.declaration {
            self.write_declaration(decl_prefix, decl_uri)?;
        }
        self.start_tag_open = true;
        self.empty_element = empty;
        self.content = ContentClass::Any;
        self.started = true;
        Ok(())
    }

    fn attribute(&mut self, prefix: Option<&str>, uri: &str, local: &str, value: &str) -> Result<()> {
        self.check_surrogate()?;
        if !self.start_tag_open {
            return Err(XmlWriteError::NoOpenStartTag("an attribute"));
        }
        if self.config.check_names {
            names::check_ncname(local, "attribute")?;
            if let Some(p) = prefix {
                names::check_prefix(p)?;
            }
        }

        let resolved = self
            .policy
            .resolve_attribute(&mut self.stack, prefix, uri, self.version)?;
        if let Some((decl_prefix, decl_uri)) = &resolved.declaration {
            self.write_declaration(decl_prefix, decl_uri)?;
        }
        if self.config.check_attributes {
            self.stack.add_attribute(uri, local)?;
        }
        if let Some(frame) = self.stack.current_mut() {
            frame.note_attribute_prefix(&resolved.prefix);
        }

        let rewritten = match self.validator.as_mut() {
            Some(v) => validated(
                self.reporter.as_mut(),
                v.validate_attribute(local, uri, &resolved.prefix, value),
            )?,
            None => None,
        };
        let value = rewritten.as_deref().unwrap_or(value);

        match &self.escaper {
            None => self.out.write_attribute(&resolved.prefix, local, value),
            Some(escaper) => {
                let quote = self.out.settings().quote.as_char();
                let mut escaped = String::with_capacity(value.len());
                escaper.escape_attribute(value, quote, &mut escaped);

                let mut head = String::with_capacity(resolved.prefix.len() + local.len() + 3);
                head.push(' ');
                if !resolved.prefix.is_empty() {
                    head.push_str(&resolved.prefix);
                    head.push(':');
                }
                head.push_str(local);
                head.push('=');
                head.push(quote);
                self.out.write_raw(&head)?;
                self.out.write_encoded(&escaped)?;
                let mut tail = [0u8; 4];
                self.out.write_raw(quote.encode_utf8(&mut tail))
            }
        }
    }

    /// Declaration produced by resolution: register it and write it
    fn write_declaration(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if self.config.check_attributes {
            let key = if prefix.is_empty() { DEFAULT_DECL_KEY } else { prefix };
            self.stack.add_attribute(XMLNS_ATTRIBUTE_NS_URI, key)?;
        }
        log::trace!(target: "xmlstream::ns", "declaring {prefix:?} = {uri:?}");
        self.out.write_namespace_decl(prefix, uri)
    }

    fn default_namespace(&mut self, uri: &str) -> Result<()> {
        if !self.start_tag_open {
            return Err(XmlWriteError::NoOpenStartTag("a namespace declaration"));
        }
        if self.policy.declare_default(&mut self.stack, uri)? {
            if self.config.check_attributes {
                self.stack
                    .add_attribute(XMLNS_ATTRIBUTE_NS_URI, DEFAULT_DECL_KEY)?;
            }
            self.out.write_namespace_decl("", uri)?;
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        self.close_open_start()?;
        let whitespace_only = is_xml_whitespace(text);
        if self.stack.is_empty() {
            if self.config.check_structure && !whitespace_only {
                return Err(XmlWriteError::OutsideRoot("non-whitespace text"));
            }
        } else {
            self.check_text_allowed(whitespace_only)?;
            self.validate_text(text)?;
        }
        if text.is_empty() {
            return Ok(());
        }
        self.started = true;
        match &self.escaper {
            None => self.out.write_escaped_text(text),
            Some(escaper) => {
                let mut escaped = String::with_capacity(text.len());
                escaper.escape_text(text, &mut escaped);
                self.out.write_encoded(&escaped)
            }
        }
    }

    /// Finish the open start tag with `>` or `/>`
    fn finish_start_tag(&mut self, empty: bool) -> Result<()> {
        self.policy.verify_start_tag(&self.stack)?;
        if let Some(v) = self.validator.as_mut() {
            self.content = validated(self.reporter.as_mut(), v.validate_element_and_attributes())?;
        }
        self.out.close_start_tag(empty)?;
        self.start_tag_open = false;
        Ok(())
    }

    /// Content is about to follow: finish any open start tag
    fn close_open_start(&mut self) -> Result<()> {
        if !self.start_tag_open {
            return Ok(());
        }
        if self.empty_element {
            self.end_element()
        } else {
            self.finish_start_tag(false)
        }
    }

    fn end_pending_empty(&mut self) -> Result<()> {
        if self.start_tag_open && self.empty_element {
            self.end_element()?;
        }
        Ok(())
    }

    /// Close the innermost element, as `/>` if its start tag is still open
    fn end_element(&mut self) -> Result<()> {
        let as_empty = self.start_tag_open && (self.empty_element || self.config.auto_empty_elements);
        if self.start_tag_open {
            self.finish_start_tag(as_empty)?;
        }
        self.empty_element = false;

        let Some(frame) = self.stack.pop() else {
            return Err(XmlWriteError::NoOpenElement);
        };
        let prefix = frame.prefix().unwrap_or("");
        if let Some(v) = self.validator.as_mut() {
            self.content = validated(
                self.reporter.as_mut(),
                v.validate_element_end(frame.local_name(), frame.namespace_uri(), prefix),
            )?;
        } else {
            self.content = ContentClass::Any;
        }
        if !as_empty {
            self.out.write_end_tag(prefix, frame.local_name())?;
        }
        self.stack.release(frame);

        if self.stack.is_empty() {
            log::debug!(target: "xmlstream::writer", "tree -> epilog");
            self.state = DocumentState::Epilog;
        }
        Ok(())
    }

    /// Close every open element, or complain if that is not allowed
    fn close_all(&mut self) -> Result<()> {
        self.end_pending_empty()?;
        while !self.stack.is_empty() {
            if !self.config.auto_end_elements {
                if self.config.check_structure {
                    return Err(XmlWriteError::UnclosedElements(self.stack.depth()));
                }
                break;
            }
            self.end_element()?;
        }
        Ok(())
    }
}

/// Turn a validator result into a writer result; warnings are reported and
/// the permissive default is used
fn validated<T: Default>(reporter: &mut dyn ProblemReporter, result: ValidationResult<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(problem) if problem.is_warning() => {
            reporter.report(&problem);
            Ok(T::default())
        }
        Err(problem) => Err(XmlWriteError::Validation(problem)),
    }
}

/// Root element name declared by a raw `<!DOCTYPE name ...>`
fn doctype_root_name(dtd: &str) -> Option<String> {
    let rest = dtd.trim_start().strip_prefix("<!DOCTYPE")?;
    let rest = rest.trim_start_matches([' ', '\t', '\r', '\n']);
    let end = rest
        .find(|c: char| !names::is_name_char(c))
        .unwrap_or(rest.len());
    (end > 0).then(|| rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentClass;
    use crate::validation::ValidationSeverity;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn strict() -> StreamWriter<XmlWriter<Vec<u8>>> {
        StreamWriter::new(Vec::new(), WriterConfig::default())
    }

    fn repairing() -> StreamWriter<XmlWriter<Vec<u8>>> {
        StreamWriter::new(Vec::new(), WriterConfig::repairing())
    }

    fn output(writer: StreamWriter<XmlWriter<Vec<u8>>>) -> String {
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_simple_document() {
        let mut w = strict();
        w.write_start_document(XmlVersion::V1_0, Some("UTF-8"), None)
            .unwrap();
        w.write_start_element(None, "root", "").unwrap();
        w.write_attribute(None, "", "id", "1").unwrap();
        w.write_characters("a < b").unwrap();
        w.write_empty_element(None, "br", "").unwrap();
        w.write_end_element().unwrap();
        w.write_end_document().unwrap();
        assert_eq!(
            output(w),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><root id=\"1\">a &lt; b<br/></root>"
        );
    }

    #[test]
    fn test_entity_ref_marks_document_started() {
        let mut w = StreamWriter::new(Vec::new(), WriterConfig::lenient());
        w.write_entity_ref("nbsp").unwrap();
        assert!(w.started);
        w.write_start_element(None, "r", "").unwrap();
        w.write_end_document().unwrap();
        assert_eq!(output(w), "&nbsp;<r/>");
    }

    #[test]
    fn test_state_transitions() {
        let mut w = strict();
        assert_eq!(w.state(), DocumentState::Prolog);
        w.write_start_element(None, "r", "").unwrap();
        assert_eq!(w.state(), DocumentState::Tree);
        assert_eq!(w.depth(), 1);
        w.write_end_element().unwrap();
        assert_eq!(w.state(), DocumentState::Epilog);
        w.write_comment("after").unwrap();
        assert_eq!(output(w), "<r/><!--after-->");
    }

    #[test]
    fn test_auto_empty_elements_off() {
        let mut w = StreamWriter::new(Vec::new(), WriterConfig::default().auto_empty_elements(false));
        w.write_start_element(None, "r", "").unwrap();
        w.write_end_element().unwrap();
        assert_eq!(output(w), "<r></r>");
    }

    #[test]
    fn test_end_element_without_start_fails() {
        let mut w = strict();
        let err = w.write_end_element().unwrap_err();
        assert!(matches!(err, XmlWriteError::NoOpenElement));
        assert_eq!(err.kind(), crate::error::ErrorKind::Structural);
        // terminal from here on
        assert!(matches!(
            w.write_start_element(None, "r", ""),
            Err(XmlWriteError::Closed)
        ));
    }

    #[test]
    fn test_second_root_rejected() {
        let mut w = strict();
        w.write_empty_element(None, "a", "").unwrap();
        w.write_end_document().unwrap();
        let err = w.write_start_element(None, "b", "").unwrap_err();
        assert!(matches!(err, XmlWriteError::SecondRoot(_)));
    }

    #[test]
    fn test_fragments_allowed_without_structure_checks() {
        let mut w = StreamWriter::new(Vec::new(), WriterConfig::lenient());
        w.write_empty_element(None, "a", "").unwrap();
        w.write_empty_element(None, "b", "").unwrap();
        w.write_characters("tail").unwrap();
        w.write_end_document().unwrap();
        assert_eq!(output(w), "<a/><b/>tail");
    }

    #[test]
    fn test_text_outside_root() {
        let mut w = strict();
        w.write_characters("\n").unwrap();
        let err = w.write_characters("oops").unwrap_err();
        assert!(matches!(err, XmlWriteError::OutsideRoot(_)));

        let mut w = strict();
        assert!(matches!(
            w.write_cdata("x"),
            Err(XmlWriteError::OutsideRoot(_))
        ));
    }

    #[test]
    fn test_empty_document() {
        let mut w = strict();
        assert!(matches!(
            w.write_end_document(),
            Err(XmlWriteError::EmptyDocument)
        ));
    }

    #[test]
    fn test_unclosed_elements() {
        let config = WriterConfig::default().auto_end_elements(false);
        let mut w = StreamWriter::new(Vec::new(), config);
        w.write_start_element(None, "a", "").unwrap();
        w.write_start_element(None, "b", "").unwrap();
        assert!(matches!(
            w.write_end_document(),
            Err(XmlWriteError::UnclosedElements(2))
        ));
    }

    #[test]
    fn test_end_document_closes_lifo() {
        let mut w = strict();
        w.write_start_element(None, "a", "").unwrap();
        w.write_start_element(None, "b", "").unwrap();
        w.write_characters("x").unwrap();
        w.write_end_document().unwrap();
        assert_eq!(output(w), "<a><b>x</b></a>");
    }

    #[test]
    fn test_empty_element_then_end_closes_parent() {
        let mut w = strict();
        w.write_start_element(None, "p", "").unwrap();
        w.write_empty_element(None, "e", "").unwrap();
        w.write_attribute(None, "", "k", "v").unwrap();
        w.write_end_element().unwrap();
        assert_eq!(w.depth(), 0);
        assert_eq!(output(w), "<p><e k=\"v\"/></p>");
    }

    #[test]
    fn test_mismatched_end_tag() {
        let mut w = strict();
        w.write_start_element(None, "a", "").unwrap();
        let err = w.write_end_element_named("", "b").unwrap_err();
        assert!(matches!(err, XmlWriteError::MismatchedEndTag { .. }));
    }

    #[test]
    fn test_attribute_without_start_tag() {
        let mut w = strict();
        w.write_start_element(None, "a", "").unwrap();
        w.write_characters("x").unwrap();
        assert!(matches!(
            w.write_attribute(None, "", "k", "v"),
            Err(XmlWriteError::NoOpenStartTag(_))
        ));
    }

    #[test]
    fn test_duplicate_attribute() {
        let mut w = strict();
        w.write_start_element(None, "a", "").unwrap();
        w.write_attribute(None, "", "k", "1").unwrap();
        assert!(matches!(
            w.write_attribute(None, "", "k", "2"),
            Err(XmlWriteError::DuplicateAttribute { .. })
        ));
    }

    #[test]
    fn test_duplicate_namespace_declaration() {
        let mut w = strict();
        w.write_start_element(Some("p"), "a", "urn:p").unwrap();
        w.write_namespace("p", "urn:p").unwrap();
        assert!(matches!(
            w.write_namespace("p", "urn:p"),
            Err(XmlWriteError::DuplicateAttribute { .. })
        ));
    }

    #[test]
    fn test_strict_namespaces() {
        let mut w = strict();
        w.write_start_element(Some("p"), "root", "urn:p").unwrap();
        w.write_namespace("p", "urn:p").unwrap();
        w.write_default_namespace("urn:d").unwrap();
        w.write_start_element(None, "child", "urn:d").unwrap();
        w.write_attribute(Some("p"), "urn:p", "attr", "v").unwrap();
        w.write_end_document().unwrap();
        assert_eq!(
            output(w),
            "<p:root xmlns:p=\"urn:p\" xmlns=\"urn:d\"><child p:attr=\"v\"/></p:root>"
        );
    }

    #[test]
    fn test_strict_undeclared_element_prefix_fails_on_close() {
        let mut w = strict();
        w.write_start_element(Some("p"), "root", "urn:p").unwrap();
        let err = w.write_characters("x").unwrap_err();
        assert!(matches!(err, XmlWriteError::UnboundNamespace { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Namespace);
    }

    #[test]
    fn test_strict_set_prefix_binds_without_declaring() {
        let mut w = strict();
        w.set_prefix("x", "urn:x").unwrap();
        w.write_start_element(None, "root", "urn:x").unwrap();
        assert_eq!(w.prefix_for("urn:x").as_deref(), Some("x"));
        w.write_end_element().unwrap();
        assert_eq!(output(w), "<x:root/>");
    }

    #[test]
    fn test_strict_unbound_attribute_fails() {
        let mut w = strict();
        w.write_start_element(None, "root", "").unwrap();
        let err = w
            .write_attribute(None, "urn:missing", "a", "v")
            .unwrap_err();
        assert!(matches!(err, XmlWriteError::UnboundNamespace { .. }));
    }

    #[test]
    fn test_repairing_siblings_share_prefix() {
        let mut w = repairing();
        w.write_start_element(None, "outer", "urn:a").unwrap();
        w.write_empty_element(None, "one", "urn:a").unwrap();
        w.write_empty_element(None, "two", "urn:a").unwrap();
        w.write_end_document().unwrap();
        assert_eq!(
            output(w),
            "<ns1:outer xmlns:ns1=\"urn:a\"><ns1:one/><ns1:two/></ns1:outer>"
        );
    }

    #[test]
    fn test_repairing_attribute_reuses_prefix() {
        let mut w = repairing();
        w.write_start_element(Some("p"), "e", "urn:a").unwrap();
        w.write_attribute(None, "urn:a", "x", "1").unwrap();
        w.write_end_document().unwrap();
        assert_eq!(output(w), "<p:e xmlns:p=\"urn:a\" p:x=\"1\"/>");
    }

    #[test]
    fn test_repairing_skips_redundant_declaration() {
        let mut w = repairing();
        w.write_start_element(Some("p"), "e", "urn:a").unwrap();
        w.write_namespace("p", "urn:a").unwrap();
        w.write_start_element(None, "c", "").unwrap();
        w.write_namespace("p", "urn:a").unwrap();
        w.write_end_document().unwrap();
        assert_eq!(output(w), "<p:e xmlns:p=\"urn:a\"><c/></p:e>");
    }

    #[test]
    fn test_repairing_lookup_accessors() {
        let mut w = repairing();
        w.write_start_element(Some(""), "root", "urn:d").unwrap();
        w.write_start_element(None, "c", "urn:x").unwrap();
        assert_eq!(w.prefix_for("urn:d").as_deref(), Some(""));
        assert_eq!(w.prefix_for("urn:x").as_deref(), Some("ns1"));
        assert_eq!(w.namespace_uri_for("ns1").as_deref(), Some("urn:x"));
        assert_eq!(w.namespace_uri_for("nope"), None);
    }

    #[test]
    fn test_xml_reserved_binding() {
        let mut w = strict();
        w.write_start_element(None, "root", "").unwrap();
        let err = w.write_namespace("xml", "urn:other").unwrap_err();
        assert!(matches!(err, XmlWriteError::ReservedBinding { .. }));
    }

    #[test]
    fn test_comment_fixing() {
        let mut w = strict();
        w.write_comment("a--b-").unwrap();
        w.write_empty_element(None, "r", "").unwrap();
        w.write_end_document().unwrap();
        assert_eq!(output(w), "<!--a- -b- --><r/>");
    }

    #[test]
    fn test_comment_without_fixing_reports_offset() {
        let mut w = StreamWriter::new(Vec::new(), WriterConfig::default().fix_content(false));
        let err = w.write_comment("ab--c").unwrap_err();
        assert!(matches!(
            err,
            XmlWriteError::IllegalSequence { offset: 2, .. }
        ));
    }

    #[test]
    fn test_pi() {
        let mut w = strict();
        w.write_processing_instruction("xml-stylesheet", "href=\"a.xsl\"")
            .unwrap();
        assert!(matches!(
            w.write_processing_instruction("t", "a?>b"),
            Err(XmlWriteError::IllegalSequence { offset: 1, .. })
        ));

        let mut w = strict();
        assert!(w.write_processing_instruction("XML", "").is_err());
    }

    #[test]
    fn test_doctype_root_check() {
        let mut w = strict();
        w.write_doctype("html", None, Some("about:legacy-compat"), None)
            .unwrap();
        let err = w.write_start_element(None, "body", "").unwrap_err();
        assert!(matches!(err, XmlWriteError::RootElementMismatch { .. }));

        let mut w = strict();
        w.write_dtd("<!DOCTYPE note SYSTEM \"note.dtd\">").unwrap();
        w.write_empty_element(None, "note", "").unwrap();
        w.write_end_document().unwrap();
        assert_eq!(output(w), "<!DOCTYPE note SYSTEM \"note.dtd\"><note/>");
    }

    #[test]
    fn test_doctype_after_root_fails() {
        let mut w = strict();
        w.write_empty_element(None, "r", "").unwrap();
        w.write_end_document().unwrap();
        assert!(matches!(
            w.write_dtd("<!DOCTYPE r>"),
            Err(XmlWriteError::NotInProlog(_))
        ));
    }

    #[test]
    fn test_declaration_must_come_first() {
        let mut w = strict();
        w.write_comment("c").unwrap();
        assert!(matches!(
            w.write_start_document(XmlVersion::V1_0, None, None),
            Err(XmlWriteError::NotInProlog(_))
        ));
    }

    #[test]
    fn test_surrogate_split_across_calls() {
        let mut w = strict();
        w.write_start_element(None, "r", "").unwrap();
        w.write_characters_utf16(&[0x61, 0xD83D]).unwrap();
        w.write_characters_utf16(&[0xDE00, 0x62]).unwrap();
        w.write_end_document().unwrap();
        assert_eq!(output(w), "<r>a\u{1F600}b</r>");
    }

    #[test]
    fn test_pending_surrogate_blocks_other_calls() {
        let mut w = strict();
        w.write_start_element(None, "r", "").unwrap();
        w.write_characters_utf16(&[0xD83D]).unwrap();
        let err = w.write_end_element().unwrap_err();
        assert!(matches!(err, XmlWriteError::UnpairedSurrogate(0xD83D)));
        assert_eq!(err.kind(), crate::error::ErrorKind::Surrogate);
    }

    #[test]
    fn test_latin1_unencodable_escaped() {
        let mut w = StreamWriter::with_encoding(Vec::new(), "ISO-8859-1", WriterConfig::default());
        w.write_start_element(None, "r", "").unwrap();
        w.write_characters("caf\u{E9} \u{1F600}").unwrap();
        w.write_end_document().unwrap();
        assert_eq!(w.into_inner().unwrap(), b"<r>caf\xE9 &#x1F600;</r>".to_vec());
    }

    #[test]
    fn test_latin1_unencodable_fails_by_policy() {
        let config = WriterConfig::default().unencodable(crate::types::UnencodablePolicy::Fail);
        let mut w = StreamWriter::with_encoding(Vec::new(), "ISO-8859-1", config);
        w.write_start_element(None, "r", "").unwrap();
        let err = w.write_characters("\u{1F600}").unwrap_err();
        assert!(matches!(
            err,
            XmlWriteError::Unencodable { code_point: 0x1F600, .. }
        ));
    }

    #[test]
    fn test_error_flushes_buffered_output() {
        let mut w = strict();
        w.write_start_element(None, "r", "").unwrap();
        w.write_characters("partial").unwrap();
        assert!(w.write_cdata("a]]>b").is_ok());
        let _ = w.write_end_element_named("", "other");
        assert!(w.is_closed());
        assert_eq!(
            String::from_utf8(w.output().get_ref().unwrap().clone()).unwrap(),
            "<r>partial<![CDATA[a]]]]><![CDATA[>b]]>"
        );
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut w = StreamWriter::new(Vec::new(), WriterConfig::default());
        w.write_start_element(None, "r", "").unwrap();
        w.close().unwrap();
        w.close().unwrap();
        assert!(w.is_closed());
        assert!(matches!(w.write_comment("x"), Err(XmlWriteError::Closed)));
        assert_eq!(output(w), "<r/>");
    }

    #[test]
    fn test_close_with_auto_close_drops_sink() {
        let config = WriterConfig::default().auto_close_output(true);
        let mut w = StreamWriter::new(Vec::new(), config);
        w.write_empty_element(None, "r", "").unwrap();
        w.close().unwrap();
        assert!(w.output().get_ref().is_none());
    }

    #[test]
    fn test_fmt_sink() {
        let mut w = StreamWriter::for_fmt(String::new(), WriterConfig::default());
        w.write_start_element(None, "r", "").unwrap();
        w.write_characters("\u{1F600} & more").unwrap();
        w.write_end_document().unwrap();
        assert_eq!(w.into_inner().unwrap(), "<r>\u{1F600} &amp; more</r>");
    }

    #[test]
    fn test_namespace_context() {
        use crate::namespace::SimpleNamespaceContext;

        let mut w = strict();
        w.set_namespace_context(Box::new(
            SimpleNamespaceContext::new().bind("soap", "urn:soap"),
        ))
        .unwrap();
        w.write_start_element(None, "Body", "urn:soap").unwrap();
        w.write_end_document().unwrap();
        assert_eq!(output(w), "<soap:Body/>");
    }

    #[test]
    fn test_namespace_context_after_root_fails() {
        use crate::namespace::SimpleNamespaceContext;

        let mut w = strict();
        w.write_start_element(None, "r", "").unwrap();
        assert!(w
            .set_namespace_context(Box::new(SimpleNamespaceContext::new()))
            .is_err());
    }

    #[test]
    fn test_name_checks() {
        let mut w = StreamWriter::new(Vec::new(), WriterConfig::strict());
        let err = w.write_start_element(None, "1bad", "").unwrap_err();
        assert!(matches!(err, XmlWriteError::InvalidName { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Content);
    }

    struct UpperEscaper;

    impl Escaper for UpperEscaper {
        fn escape_text(&self, text: &str, out: &mut String) {
            out.push_str(&text.to_uppercase());
        }

        fn escape_attribute(&self, value: &str, quote: char, out: &mut String) {
            out.push_str(&value.replace(quote, "&quot;").to_uppercase());
        }
    }

    #[test]
    fn test_custom_escaper() {
        let mut w = strict();
        w.set_escaper(Box::new(UpperEscaper));
        w.write_start_element(None, "r", "").unwrap();
        w.write_attribute(None, "", "a", "x\"y").unwrap();
        w.write_characters("text").unwrap();
        w.write_end_document().unwrap();
        assert_eq!(output(w), "<r a=\"X&QUOT;Y\">TEXT</r>");
    }

    /// Validator that logs calls and enforces a tiny content model
    struct Recording {
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl Validator for Recording {
        fn validate_element_start(&mut self, local: &str, _uri: &str, _prefix: &str) -> ValidationResult<()> {
            self.calls.borrow_mut().push(format!("start {local}"));
            if local == "warn" {
                return Err(ValidationProblem::warning("discouraged element"));
            }
            Ok(())
        }

        fn validate_attribute(
            &mut self,
            local: &str,
            _uri: &str,
            _prefix: &str,
            value: &str,
        ) -> ValidationResult<Option<String>> {
            self.calls.borrow_mut().push(format!("attr {local}"));
            Ok((local == "norm").then(|| value.trim().to_string()))
        }

        fn validate_element_and_attributes(&mut self) -> ValidationResult<ContentClass> {
            let calls = self.calls.borrow();
            let last_start = calls.iter().rev().find(|c| c.starts_with("start "));
            Ok(match last_start.map(String::as_str) {
                Some("start list") => ContentClass::ElementOnly,
                Some("start void") => ContentClass::Empty,
                _ => ContentClass::Mixed,
            })
        }

        fn validate_element_end(&mut self, local: &str, _uri: &str, _prefix: &str) -> ValidationResult<ContentClass> {
            self.calls.borrow_mut().push(format!("end {local}"));
            Ok(ContentClass::Mixed)
        }
    }

    fn recording() -> (Box<Recording>, Rc<RefCell<Vec<String>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        (
            Box::new(Recording {
                calls: Rc::clone(&calls),
            }),
            calls,
        )
    }

    #[test]
    fn test_validator_checkpoints() {
        let (validator, calls) = recording();
        let mut w = strict();
        w.set_validator(validator);
        w.write_start_element(None, "doc", "").unwrap();
        w.write_attribute(None, "", "norm", "  v  ").unwrap();
        w.write_characters("t").unwrap();
        w.write_start_element(None, "warn", "").unwrap();
        w.write_end_document().unwrap();

        assert_eq!(
            *calls.borrow(),
            vec!["start doc", "attr norm", "start warn", "end warn", "end doc"]
        );
        assert_eq!(output(w), "<doc norm=\"v\">t<warn/></doc>");
    }

    #[test]
    fn test_element_only_content_rejects_text() {
        let (validator, _calls) = recording();
        let mut w = strict();
        w.set_validator(validator);
        w.write_start_element(None, "list", "").unwrap();
        w.write_characters("\n  ").unwrap();
        let err = w.write_characters("words").unwrap_err();
        match err {
            XmlWriteError::Validation(problem) => {
                assert_eq!(problem.severity, ValidationSeverity::Error)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_content_rejects_children() {
        let (validator, _calls) = recording();
        let mut w = strict();
        w.set_validator(validator);
        w.write_start_element(None, "void", "").unwrap();
        assert!(matches!(
            w.write_start_element(None, "child", ""),
            Err(XmlWriteError::Validation(_))
        ));
    }

    #[test]
    fn test_doctype_root_name() {
        assert_eq!(
            doctype_root_name("<!DOCTYPE html>").as_deref(),
            Some("html")
        );
        assert_eq!(
            doctype_root_name("<!DOCTYPE\n  x:doc [ ]>").as_deref(),
            Some("x:doc")
        );
        assert_eq!(doctype_root_name("<!-- not a doctype -->"), None);
    }
}
