//! Error types for the xmlstream writer

use thiserror::Error;

use crate::validation::ValidationProblem;

/// Result type alias for xmlstream operations
pub type Result<T> = std::result::Result<T, XmlWriteError>;

/// Broad category of a writer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Calls made in an order that cannot produce a well-formed document.
    Structural,
    /// Illegal or inconsistent namespace bindings.
    Namespace,
    /// Characters or character sequences that cannot be written.
    Content,
    /// A UTF-16 surrogate that never found its other half.
    Surrogate,
    /// The sink failed.
    Io,
    /// An injected validator reported an error.
    Validation,
    /// The writer was already closed or failed earlier.
    Closed,
}

/// Main error type for all writer operations
#[derive(Error, Debug)]
pub enum XmlWriteError {
    /// End element requested while no element is open
    #[error("No open element to close")]
    NoOpenElement,

    /// A second root element was started under structural checking
    #[error("Trying to output second root element <{0}>")]
    SecondRoot(String),

    /// End tag name does not match the open element
    #[error("Mismatched end tag: expected </{expected}>, got </{found}>")]
    MismatchedEndTag { expected: String, found: String },

    /// Document ended without any root element
    #[error("Trying to write end of document with no root element (empty document)")]
    EmptyDocument,

    /// Document ended while elements were still open
    #[error("Document ended with {0} unclosed element(s)")]
    UnclosedElements(usize),

    /// Attribute or namespace declaration written without an open start tag
    #[error("Trying to write {0} when no start tag is open")]
    NoOpenStartTag(&'static str),

    /// Content that is only allowed inside the root element
    #[error("Trying to output {0} outside the root element")]
    OutsideRoot(&'static str),

    /// Prolog-only construct written too late (or twice)
    #[error("Trying to output {0} after the prolog")]
    NotInProlog(&'static str),

    /// Root element does not match the DOCTYPE declaration
    #[error("Root element <{found}> does not match DOCTYPE root <{expected}>")]
    RootElementMismatch { expected: String, found: String },

    /// No binding in scope for the namespace of an element or attribute
    #[error("Unbound namespace {uri:?} (prefix {prefix:?})")]
    UnboundNamespace { prefix: Option<String>, uri: String },

    /// Prefix is bound, but to a different namespace URI
    #[error("Prefix {prefix:?} is bound to {bound:?}, not to {requested:?}")]
    MismatchedBinding {
        prefix: String,
        bound: String,
        requested: String,
    },

    /// Attempt to rebind `xml`/`xmlns` or to bind their reserved URIs
    #[error("Illegal namespace binding {prefix:?} -> {uri:?}: reserved")]
    ReservedBinding { prefix: String, uri: String },

    /// The empty URI bound to a non-empty prefix under XML 1.0
    #[error("Cannot bind prefix {0:?} to the empty namespace URI in XML 1.0")]
    EmptyUriBinding(String),

    /// Same (namespace URI, local name) twice in one start tag
    #[error("Duplicate attribute {local:?} (namespace {uri:?})")]
    DuplicateAttribute { uri: String, local: String },

    /// Unfixable `]]>`, `--` or `?>` inside a construct
    #[error("Illegal {construct} content at offset {offset}")]
    IllegalSequence {
        construct: &'static str,
        offset: usize,
    },

    /// Character not allowed by the XML version in use
    #[error("Invalid XML character U+{code_point:04X} in {context}")]
    InvalidChar {
        code_point: u32,
        context: &'static str,
    },

    /// Character outside what the output encoding can represent
    #[error("Character U+{code_point:04X} cannot be represented in {encoding}")]
    Unencodable { code_point: u32, encoding: String },

    /// Name is not a legal XML name
    #[error("Illegal {kind} name {name:?}")]
    InvalidName { kind: &'static str, name: String },

    /// UTF-16 surrogate without its other half
    #[error("Unpaired surrogate 0x{0:04X}")]
    UnpairedSurrogate(u16),

    /// Problem raised by an injected validator
    #[error("Validation error: {0}")]
    Validation(ValidationProblem),

    /// Writer closed, or left unusable by an earlier error
    #[error("Writer is closed or in a failed state")]
    Closed,

    /// IO error wrapper
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Character sink error wrapper
    #[error("Formatting sink error")]
    FmtError(#[from] std::fmt::Error),
}

impl XmlWriteError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        use XmlWriteError::*;
        match self {
            NoOpenElement
            | SecondRoot(_)
            | MismatchedEndTag { .. }
            | EmptyDocument
            | UnclosedElements(_)
            | NoOpenStartTag(_)
            | OutsideRoot(_)
            | NotInProlog(_)
            | RootElementMismatch { .. } => ErrorKind::Structural,
            UnboundNamespace { .. }
            | MismatchedBinding { .. }
            | ReservedBinding { .. }
            | EmptyUriBinding(_)
            | DuplicateAttribute { .. } => ErrorKind::Namespace,
            IllegalSequence { .. }
            | InvalidChar { .. }
            | Unencodable { .. }
            | InvalidName { .. } => ErrorKind::Content,
            UnpairedSurrogate(_) => ErrorKind::Surrogate,
            Validation(_) => ErrorKind::Validation,
            Closed => ErrorKind::Closed,
            IoError(_) | FmtError(_) => ErrorKind::Io,
        }
    }
}
