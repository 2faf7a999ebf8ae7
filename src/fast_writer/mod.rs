//! Low-level buffered XML output
//!
//! This module provides the layer that turns already-sequenced markup into
//! bytes or characters. It focuses on:
//! - Minimal copies: small writes are coalesced, large ones pass through
//! - Encoding awareness: characters the charset cannot hold become references
//! - Content safety: escaping plus repair of `]]>` and `--`
//!
//! [`XmlOutput`] is the common contract. [`XmlWriter`] writes to an
//! [`std::io::Write`] byte sink, [`CharWriter`] to an [`std::fmt::Write`]
//! character sink.

pub mod char_writer;
pub mod encoding;
pub mod escape;
pub mod xml_writer;

use crate::config::WriterConfig;
use crate::error::{Result, XmlWriteError};
use crate::types::{InvalidCharPolicy, QuoteChar, UnencodablePolicy, XmlVersion};

pub use char_writer::CharWriter;
pub use encoding::Encoding;
pub use xml_writer::XmlWriter;

/// Escaping switches shared by both writer flavours
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EscapeSettings {
    pub xml_version: XmlVersion,
    pub escape_cr: bool,
    pub fix_content: bool,
    pub invalid_chars: InvalidCharPolicy,
    pub unencodable: UnencodablePolicy,
    pub quote: QuoteChar,
    pub space_before_empty_close: bool,
}

impl Default for EscapeSettings {
    fn default() -> Self {
        EscapeSettings::from(&WriterConfig::default())
    }
}

impl From<&WriterConfig> for EscapeSettings {
    fn from(config: &WriterConfig) -> Self {
        EscapeSettings {
            xml_version: config.xml_version,
            escape_cr: config.escape_cr,
            fix_content: config.fix_content,
            invalid_chars: config.invalid_chars,
            unencodable: config.unencodable,
            quote: config.quote,
            space_before_empty_close: config.space_before_empty_close,
        }
    }
}

/// Buffered, encoding-aware XML output.
///
/// Implementors supply the buffer primitives; the escaping and markup
/// methods are provided on top of them. Methods returning
/// `Result<Option<usize>>` report `Ok(Some(offset))` when the input holds a
/// sequence that cannot be written in that construct (byte offset into the
/// input); nothing is written in that case.
pub trait XmlOutput {
    /// Append text that needs no escaping. Fails with
    /// [`XmlWriteError::Unencodable`] if a character is outside the encoding.
    fn write_raw(&mut self, text: &str) -> Result<()>;

    fn encoding(&self) -> &Encoding;

    fn settings(&self) -> &EscapeSettings;

    fn settings_mut(&mut self) -> &mut EscapeSettings;

    /// The pending-surrogate cell
    fn pending_surrogate(&mut self) -> &mut Option<u16>;

    /// Number of `]` characters at the very end of what has been written
    fn trailing_brackets(&self) -> usize;

    /// Hand buffered output to the sink without flushing the sink itself
    fn flush_buffer(&mut self) -> Result<()>;

    /// Flush the sink
    fn flush_sink(&mut self) -> Result<()>;

    /// Free the buffer and, if `close_sink`, drop the sink. Further writes fail.
    fn release(&mut self, close_sink: bool);

    fn is_closed(&self) -> bool;

    /// Highest code point the encoding writes literally
    fn max_code_point(&self) -> u32 {
        self.encoding().max_code_point()
    }

    fn write_escaped_text(&mut self, text: &str) -> Result<()> {
        escape::write_text(self, text)
    }

    /// Write UTF-16 text, carrying a trailing high surrogate to the next call
    fn write_escaped_text_utf16(&mut self, units: &[u16]) -> Result<()> {
        let mut decoded = String::with_capacity(units.len());
        encoding::decode_utf16_chunk(self.pending_surrogate(), units, &mut decoded)?;
        escape::write_text(self, &decoded)
    }

    fn write_escaped_attr_value(&mut self, value: &str) -> Result<()> {
        escape::write_attr_value(self, value)
    }

    /// Write text produced by a custom escaper: only encodability is checked
    fn write_encoded(&mut self, text: &str) -> Result<()> {
        escape::write_encoded(self, text)
    }

    fn write_cdata(&mut self, data: &str) -> Result<Option<usize>> {
        escape::write_cdata(self, data)
    }

    fn write_comment(&mut self, data: &str) -> Result<Option<usize>> {
        escape::write_comment(self, data)
    }

    fn write_pi(&mut self, target: &str, data: &str) -> Result<Option<usize>> {
        escape::write_pi(self, target, data)
    }

    fn write_char_ref(&mut self, code_point: u32) -> Result<()> {
        escape::write_char_ref(self, code_point)
    }

    fn write_entity_ref(&mut self, name: &str) -> Result<()> {
        self.write_raw("&")?;
        self.write_raw(name)?;
        self.write_raw(";")
    }

    /// `<prefix:local`
    fn write_start_tag(&mut self, prefix: &str, local: &str) -> Result<()> {
        self.write_raw("<")?;
        write_qname(self, prefix, local)
    }

    /// ` prefix:local="value"`
    fn write_attribute(&mut self, prefix: &str, local: &str, value: &str) -> Result<()> {
        let quote = self.settings().quote;
        self.write_raw(" ")?;
        write_qname(self, prefix, local)?;
        self.write_raw("=")?;
        self.write_raw(quote_str(quote))?;
        self.write_escaped_attr_value(value)?;
        self.write_raw(quote_str(quote))
    }

    /// ` xmlns:prefix="uri"`, or ` xmlns="uri"` for the empty prefix
    fn write_namespace_decl(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if prefix.is_empty() {
            self.write_attribute("", "xmlns", uri)
        } else {
            self.write_attribute("xmlns", prefix, uri)
        }
    }

    /// `>` or `/>`
    fn close_start_tag(&mut self, empty: bool) -> Result<()> {
        if !empty {
            self.write_raw(">")
        } else if self.settings().space_before_empty_close {
            self.write_raw(" />")
        } else {
            self.write_raw("/>")
        }
    }

    /// `</prefix:local>`
    fn write_end_tag(&mut self, prefix: &str, local: &str) -> Result<()> {
        self.write_raw("</")?;
        write_qname(self, prefix, local)?;
        self.write_raw(">")
    }

    fn write_xml_declaration(
        &mut self,
        version: XmlVersion,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> Result<()> {
        self.write_raw("<?xml version=\"")?;
        self.write_raw(version.as_str())?;
        self.write_raw("\"")?;
        if let Some(enc) = encoding {
            self.write_raw(" encoding=\"")?;
            self.write_raw(enc)?;
            self.write_raw("\"")?;
        }
        if let Some(sa) = standalone {
            self.write_raw(if sa {
                " standalone=\"yes\""
            } else {
                " standalone=\"no\""
            })?;
        }
        self.write_raw("?>")
    }

    fn write_doctype(
        &mut self,
        root: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
        internal_subset: Option<&str>,
    ) -> Result<()> {
        self.write_raw("<!DOCTYPE ")?;
        self.write_raw(root)?;
        if let Some(pub_id) = public_id {
            self.write_raw(" PUBLIC ")?;
            write_literal(self, pub_id)?;
            // PUBLIC requires a system literal, even an empty one
            self.write_raw(" ")?;
            write_literal(self, system_id.unwrap_or(""))?;
        } else if let Some(sys_id) = system_id {
            self.write_raw(" SYSTEM ")?;
            write_literal(self, sys_id)?;
        }
        if let Some(subset) = internal_subset {
            self.write_raw(" [")?;
            self.write_raw(subset)?;
            self.write_raw("]")?;
        }
        self.write_raw(">")
    }

    /// Flush buffer and sink. Fails if a surrogate is still pending.
    fn flush(&mut self) -> Result<()> {
        if let Some(high) = *self.pending_surrogate() {
            return Err(XmlWriteError::UnpairedSurrogate(high));
        }
        self.flush_buffer()?;
        self.flush_sink()
    }

    /// Flush everything and release resources. Closing twice is a no-op.
    fn close(&mut self, close_sink: bool) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.flush()?;
        self.release(close_sink);
        Ok(())
    }
}

fn quote_str(quote: QuoteChar) -> &'static str {
    match quote {
        QuoteChar::Double => "\"",
        QuoteChar::Single => "'",
    }
}

fn write_qname<O: XmlOutput + ?Sized>(out: &mut O, prefix: &str, local: &str) -> Result<()> {
    if !prefix.is_empty() {
        out.write_raw(prefix)?;
        out.write_raw(":")?;
    }
    out.write_raw(local)
}

/// Public/system literal: quoted with whichever quote it does not contain
fn write_literal<O: XmlOutput + ?Sized>(out: &mut O, literal: &str) -> Result<()> {
    let quote = if literal.contains('"') { "'" } else { "\"" };
    out.write_raw(quote)?;
    out.write_raw(literal)?;
    out.write_raw(quote)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> XmlWriter<Vec<u8>> {
        XmlWriter::new(Vec::new())
    }

    fn text(out: XmlWriter<Vec<u8>>) -> String {
        String::from_utf8(out.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_markup_helpers() {
        let mut out = output();
        out.write_start_tag("p", "root").unwrap();
        out.write_namespace_decl("p", "urn:a").unwrap();
        out.write_namespace_decl("", "urn:b").unwrap();
        out.write_attribute("", "id", "1 < 2").unwrap();
        out.close_start_tag(false).unwrap();
        out.write_entity_ref("ent").unwrap();
        out.write_end_tag("p", "root").unwrap();
        assert_eq!(
            text(out),
            "<p:root xmlns:p=\"urn:a\" xmlns=\"urn:b\" id=\"1 &lt; 2\">&ent;</p:root>"
        );
    }

    #[test]
    fn test_empty_close_spacing() {
        let mut out = output();
        out.settings_mut().space_before_empty_close = true;
        out.write_start_tag("", "a").unwrap();
        out.close_start_tag(true).unwrap();
        assert_eq!(text(out), "<a />");
    }

    #[test]
    fn test_declaration_and_doctype() {
        let mut out = output();
        out.write_xml_declaration(XmlVersion::V1_0, Some("UTF-8"), Some(true))
            .unwrap();
        out.write_doctype("html", Some("-//W3C//DTD XHTML 1.0//EN"), Some("x.dtd"), None)
            .unwrap();
        assert_eq!(
            text(out),
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0//EN\" \"x.dtd\">"
        );
    }

    #[test]
    fn test_single_quoted_attributes() {
        let mut out = output();
        out.settings_mut().quote = QuoteChar::Single;
        out.write_attribute("", "a", "it's \"x\"").unwrap();
        assert_eq!(text(out), " a='it&apos;s \"x\"'");
    }

    #[test]
    fn test_flush_with_pending_surrogate_fails() {
        let mut out = output();
        out.write_escaped_text_utf16(&[0x61, 0xD83D]).unwrap();
        let err = out.flush().unwrap_err();
        assert!(matches!(err, XmlWriteError::UnpairedSurrogate(0xD83D)));
    }
}
