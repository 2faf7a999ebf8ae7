//! Shared value types for the writer

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where in the document the writer currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentState {
    /// Before the root element
    Prolog,
    /// Inside the root element
    Tree,
    /// After the root element was closed
    Epilog,
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentState::Prolog => write!(f, "prolog"),
            DocumentState::Tree => write!(f, "tree"),
            DocumentState::Epilog => write!(f, "epilog"),
        }
    }
}

/// XML version of the output document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum XmlVersion {
    #[default]
    V1_0,
    V1_1,
}

impl XmlVersion {
    /// Value used in the XML declaration
    pub fn as_str(&self) -> &'static str {
        match self {
            XmlVersion::V1_0 => "1.0",
            XmlVersion::V1_1 => "1.1",
        }
    }

    /// Parse a version string from an XML declaration
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.trim() {
            "1.0" => Some(XmlVersion::V1_0),
            "1.1" => Some(XmlVersion::V1_1),
            _ => None,
        }
    }

    pub fn is_1_1(&self) -> bool {
        matches!(self, XmlVersion::V1_1)
    }
}

/// Quote character used around attribute values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum QuoteChar {
    #[default]
    Double,
    Single,
}

impl QuoteChar {
    pub fn as_char(&self) -> char {
        match self {
            QuoteChar::Double => '"',
            QuoteChar::Single => '\'',
        }
    }

    /// Predefined entity for the quote character
    pub fn entity(&self) -> &'static str {
        match self {
            QuoteChar::Double => "&quot;",
            QuoteChar::Single => "&apos;",
        }
    }
}

/// What to do with characters that XML does not allow at all
/// (control characters, U+FFFE, U+FFFF).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InvalidCharPolicy {
    /// Fail with [`XmlWriteError::InvalidChar`](crate::XmlWriteError::InvalidChar)
    Fail,
    /// Write as a numeric character reference
    #[default]
    Escape,
    /// Substitute the given character
    Replace(char),
}

/// What to do with characters the output encoding cannot represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UnencodablePolicy {
    /// Write as a numeric character reference where XML allows one
    #[default]
    Escape,
    /// Fail with [`XmlWriteError::Unencodable`](crate::XmlWriteError::Unencodable)
    Fail,
}

/// Content allowed inside the current element, as reported by a validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentClass {
    /// No content at all
    Empty,
    /// Child elements and ignorable whitespace only
    ElementOnly,
    /// Elements and text
    Mixed,
    /// Anything goes
    #[default]
    Any,
}

impl ContentClass {
    pub fn allows_elements(&self) -> bool {
        !matches!(self, ContentClass::Empty)
    }

    pub fn allows_text(&self, whitespace_only: bool) -> bool {
        match self {
            ContentClass::Empty => false,
            ContentClass::ElementOnly => whitespace_only,
            ContentClass::Mixed | ContentClass::Any => true,
        }
    }
}

/// Returns `true` if `text` consists only of XML whitespace
pub fn is_xml_whitespace(text: &str) -> bool {
    text.bytes()
        .all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
}
