//! # xmlstream
//!
//! A streaming, namespace-aware XML writer.
//!
//! ## Features
//!
//! - **Streaming**: output goes through one fixed-size buffer straight to any
//!   `io::Write` or `fmt::Write` sink
//! - **Namespaces**: strict mode checks the caller's prefixes, repairing mode
//!   invents and declares them
//! - **Encodings**: UTF-8, US-ASCII and ISO-8859-1 output, with character
//!   references for whatever the charset cannot hold
//! - **Content safety**: escaping, `]]>` and `--` repair, reassembly of UTF-16
//!   surrogate pairs split across calls
//! - **Hooks**: optional validator, problem reporter and custom escaping
//!
//! ## Quick Start
//!
//! ```rust
//! use xmlstream::{StreamWriter, WriterConfig, XmlVersion};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = StreamWriter::new(Vec::new(), WriterConfig::default());
//! writer.write_start_document(XmlVersion::V1_0, Some("UTF-8"), None)?;
//! writer.write_start_element(Some("x"), "doc", "urn:example")?;
//! writer.write_namespace("x", "urn:example")?;
//! writer.write_attribute(None, "", "id", "42")?;
//! writer.write_comment("generated")?;
//! writer.write_characters("1 < 2")?;
//! writer.write_end_document()?;
//!
//! let xml = String::from_utf8(writer.into_inner()?)?;
//! assert_eq!(
//!     xml,
//!     "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
//!      <x:doc xmlns:x=\"urn:example\" id=\"42\"><!--generated-->1 &lt; 2</x:doc>"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ### Repairing mode
//!
//! ```rust
//! use xmlstream::{StreamWriter, WriterConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = StreamWriter::for_fmt(String::new(), WriterConfig::repairing());
//! writer.write_start_element(None, "root", "urn:a")?;
//! writer.write_attribute(None, "urn:b", "flag", "on")?;
//! writer.write_end_document()?;
//!
//! assert_eq!(
//!     writer.into_inner()?,
//!     "<ns1:root xmlns:ns1=\"urn:a\" xmlns:ns2=\"urn:b\" ns2:flag=\"on\"/>"
//! );
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fast_writer;
pub mod names;
pub mod namespace;
pub mod types;
pub mod validation;
pub mod writer;

pub use config::WriterConfig;
pub use error::{ErrorKind, Result, XmlWriteError};
pub use fast_writer::{CharWriter, Encoding, XmlOutput, XmlWriter};
pub use namespace::{NamespaceContext, SimpleNamespaceContext};
pub use types::{
    ContentClass, DocumentState, InvalidCharPolicy, QuoteChar, UnencodablePolicy, XmlVersion,
};
pub use validation::{
    Escaper, ProblemReporter, ValidationProblem, ValidationSeverity, Validator,
};
pub use writer::StreamWriter;
