//! Writer configuration
//!
//! [`WriterConfig`] collects every switch the writer consults. The presets
//! mirror the common profiles:
//!
//! - [`WriterConfig::strict`]: all checks on, caller-supplied prefixes validated
//! - [`WriterConfig::repairing`]: all checks on, prefixes invented as needed
//! - [`WriterConfig::lenient`]: structural and name checks off, for fragments

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::types::{InvalidCharPolicy, QuoteChar, UnencodablePolicy, XmlVersion};

/// Default output buffer capacity in bytes (or chars for char sinks)
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Writes shorter than this are coalesced into the buffer
pub const DEFAULT_SMALL_WRITE: usize = 256;

/// Maximum number of recycled element frames
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Writer configuration flags
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WriterConfig {
    /// Reject structurally invalid call sequences (second root, text outside root, ...)
    pub check_structure: bool,
    /// Reject duplicate attributes within one start tag
    pub check_attributes: bool,
    /// Validate element, attribute, PI and entity names
    pub check_names: bool,
    /// Split CDATA at `]]>` and pad `--` in comments instead of failing
    pub fix_content: bool,
    /// Write `\r` in text as `&#xD;` so it survives parsing
    pub escape_cr: bool,
    /// Close elements without content as `<a/>`
    pub auto_empty_elements: bool,
    /// Close open elements at end of document
    pub auto_end_elements: bool,
    /// Write `<a />` rather than `<a/>`
    pub space_before_empty_close: bool,
    /// Invent namespace prefixes and declarations as needed
    pub repairing: bool,
    /// Base of generated prefixes (`ns1`, `ns2`, ...)
    pub auto_prefix: String,
    /// XML version assumed until `write_start_document` says otherwise
    pub xml_version: XmlVersion,
    /// Quote character around attribute values
    pub quote: QuoteChar,
    /// Handling of characters XML does not allow
    pub invalid_chars: InvalidCharPolicy,
    /// Handling of characters the encoding cannot represent
    pub unencodable: UnencodablePolicy,
    /// Output buffer capacity
    pub buffer_size: usize,
    /// Small-write threshold for buffer coalescing
    pub small_write: usize,
    /// Depth of the element frame pool
    pub pool_size: usize,
    /// Drop (close) the sink when the writer is closed
    pub auto_close_output: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            check_structure: true,
            check_attributes: true,
            check_names: false,
            fix_content: true,
            escape_cr: true,
            auto_empty_elements: true,
            auto_end_elements: true,
            space_before_empty_close: false,
            repairing: false,
            auto_prefix: "ns".to_string(),
            xml_version: XmlVersion::V1_0,
            quote: QuoteChar::Double,
            invalid_chars: InvalidCharPolicy::Escape,
            unencodable: UnencodablePolicy::Escape,
            buffer_size: DEFAULT_BUFFER_SIZE,
            small_write: DEFAULT_SMALL_WRITE,
            pool_size: DEFAULT_POOL_SIZE,
            auto_close_output: false,
        }
    }
}

impl WriterConfig {
    /// All checks on, prefixes must be bound by the caller
    pub fn strict() -> Self {
        WriterConfig {
            check_names: true,
            invalid_chars: InvalidCharPolicy::Fail,
            ..Default::default()
        }
    }

    /// All checks on, missing namespace bindings are repaired
    pub fn repairing() -> Self {
        WriterConfig {
            check_names: true,
            repairing: true,
            ..Default::default()
        }
    }

    /// Fragment-friendly profile: no structural or name checks
    pub fn lenient() -> Self {
        WriterConfig {
            check_structure: false,
            check_attributes: false,
            check_names: false,
            ..Default::default()
        }
    }

    pub fn check_structure(mut self, on: bool) -> Self {
        self.check_structure = on;
        self
    }

    pub fn check_attributes(mut self, on: bool) -> Self {
        self.check_attributes = on;
        self
    }

    pub fn check_names(mut self, on: bool) -> Self {
        self.check_names = on;
        self
    }

    pub fn fix_content(mut self, on: bool) -> Self {
        self.fix_content = on;
        self
    }

    pub fn escape_cr(mut self, on: bool) -> Self {
        self.escape_cr = on;
        self
    }

    pub fn auto_empty_elements(mut self, on: bool) -> Self {
        self.auto_empty_elements = on;
        self
    }

    pub fn auto_end_elements(mut self, on: bool) -> Self {
        self.auto_end_elements = on;
        self
    }

    pub fn space_before_empty_close(mut self, on: bool) -> Self {
        self.space_before_empty_close = on;
        self
    }

    pub fn repairing_mode(mut self, on: bool) -> Self {
        self.repairing = on;
        self
    }

    pub fn auto_prefix(mut self, base: &str) -> Self {
        self.auto_prefix = base.to_string();
        self
    }

    pub fn xml_version(mut self, version: XmlVersion) -> Self {
        self.xml_version = version;
        self
    }

    pub fn quote(mut self, quote: QuoteChar) -> Self {
        self.quote = quote;
        self
    }

    pub fn invalid_chars(mut self, policy: InvalidCharPolicy) -> Self {
        self.invalid_chars = policy;
        self
    }

    pub fn unencodable(mut self, policy: UnencodablePolicy) -> Self {
        self.unencodable = policy;
        self
    }

    /// Set buffer capacity; the small-write threshold is clamped below it
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(16);
        self.small_write = self.small_write.min(self.buffer_size / 2);
        self
    }

    pub fn small_write(mut self, threshold: usize) -> Self {
        self.small_write = threshold.clamp(1, self.buffer_size / 2);
        self
    }

    pub fn pool_size(mut self, depth: usize) -> Self {
        self.pool_size = depth;
        self
    }

    pub fn auto_close_output(mut self, on: bool) -> Self {
        self.auto_close_output = on;
        self
    }
}
