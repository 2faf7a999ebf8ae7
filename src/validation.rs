//! Hooks for external validators and custom escaping
//!
//! The writer consults a [`Validator`] at fixed points: element start,
//! each attribute, when the start tag closes, at the end tag, and for each
//! chunk of text. Problems of [`ValidationSeverity::Warning`] go to the
//! [`ProblemReporter`]; anything more severe stops the writer.

use std::fmt;

use crate::types::ContentClass;

/// How serious a validation problem is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValidationSeverity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationSeverity::Warning => write!(f, "warning"),
            ValidationSeverity::Error => write!(f, "error"),
            ValidationSeverity::Fatal => write!(f, "fatal"),
        }
    }
}

/// A problem raised by a validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationProblem {
    pub severity: ValidationSeverity,
    pub message: String,
}

impl ValidationProblem {
    pub fn new(severity: ValidationSeverity, message: impl Into<String>) -> Self {
        ValidationProblem {
            severity,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Error, message)
    }

    pub fn is_warning(&self) -> bool {
        self.severity == ValidationSeverity::Warning
    }
}

impl fmt::Display for ValidationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.severity)
    }
}

pub type ValidationResult<T> = std::result::Result<T, ValidationProblem>;

/// Structural validator consulted while writing.
///
/// Every method has a permissive default, so implementors override only
/// the checkpoints they care about.
pub trait Validator {
    fn validate_element_start(&mut self, local: &str, uri: &str, prefix: &str) -> ValidationResult<()> {
        let _ = (local, uri, prefix);
        Ok(())
    }

    /// `Ok(Some(value))` replaces the attribute value that gets written
    fn validate_attribute(
        &mut self,
        local: &str,
        uri: &str,
        prefix: &str,
        value: &str,
    ) -> ValidationResult<Option<String>> {
        let _ = (local, uri, prefix, value);
        Ok(None)
    }

    /// Called once the start tag is complete; returns what the element may contain
    fn validate_element_and_attributes(&mut self) -> ValidationResult<ContentClass> {
        Ok(ContentClass::Any)
    }

    /// Returns what the parent may contain from here on
    fn validate_element_end(&mut self, local: &str, uri: &str, prefix: &str) -> ValidationResult<ContentClass> {
        let _ = (local, uri, prefix);
        Ok(ContentClass::Any)
    }

    fn validate_text(&mut self, text: &str, is_last: bool) -> ValidationResult<()> {
        let _ = (text, is_last);
        Ok(())
    }
}

/// Receives validation warnings
pub trait ProblemReporter {
    fn report(&mut self, problem: &ValidationProblem);
}

/// Default reporter: log and carry on
#[derive(Debug, Default)]
pub struct LogReporter;

impl ProblemReporter for LogReporter {
    fn report(&mut self, problem: &ValidationProblem) {
        log::warn!(target: "xmlstream::writer", "validation problem: {problem}");
    }
}

/// Replacement for the built-in text and attribute escaping.
///
/// Output is still checked against the encoding before it is written.
pub trait Escaper {
    fn escape_text(&self, text: &str, out: &mut String);

    fn escape_attribute(&self, value: &str, quote: char, out: &mut String);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoOp;
    impl Validator for NoOp {}

    #[test]
    fn test_default_validator_accepts_everything() {
        let mut v = NoOp;
        assert!(v.validate_element_start("a", "", "").is_ok());
        assert_eq!(v.validate_attribute("x", "", "", "1").unwrap(), None);
        assert_eq!(v.validate_element_and_attributes().unwrap(), ContentClass::Any);
        assert!(v.validate_text("t", true).is_ok());
    }

    #[test]
    fn test_problem_display() {
        let p = ValidationProblem::error("element not allowed");
        assert_eq!(p.to_string(), "element not allowed (error)");
        assert!(!p.is_warning());
        assert!(ValidationProblem::warning("w").is_warning());
        assert!(ValidationSeverity::Fatal > ValidationSeverity::Error);
    }
}
