//! Name validity checks (XML 1.0 fifth edition productions)

use crate::error::{Result, XmlWriteError};

/// `NameStartChar`, including `:`
pub fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z' |
        '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}' |
        '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' |
        '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}' |
        '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}' |
        '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' |
        '\u{10000}'..='\u{EFFFF}'
    )
}

pub fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' |
            '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}'
        )
}

pub fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_name_start_char(first) => chars.all(is_name_char),
        _ => false,
    }
}

/// A `Name` without colons
pub fn is_ncname(name: &str) -> bool {
    !name.contains(':') && is_name(name)
}

/// Check a name that will be written as one part of a qualified name
pub fn check_ncname(name: &str, kind: &'static str) -> Result<()> {
    if is_ncname(name) {
        Ok(())
    } else {
        Err(XmlWriteError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

/// Check a prefix; the empty prefix is always fine
pub fn check_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Ok(());
    }
    check_ncname(prefix, "prefix")
}

/// PI targets are names, and `xml` in any case is reserved for the declaration
pub fn check_pi_target(target: &str) -> Result<()> {
    if !is_name(target) || target.eq_ignore_ascii_case("xml") {
        return Err(XmlWriteError::InvalidName {
            kind: "processing instruction target",
            name: target.to_string(),
        });
    }
    Ok(())
}

pub fn check_entity_name(name: &str) -> Result<()> {
    if is_name(name) {
        Ok(())
    } else {
        Err(XmlWriteError::InvalidName {
            kind: "entity",
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert!(is_name("root"));
        assert!(is_name("_a-b.c9"));
        assert!(is_name("p:local"));
        assert!(is_name("\u{E9}l\u{E9}ment"));
        assert!(!is_name(""));
        assert!(!is_name("9lives"));
        assert!(!is_name("-dash"));
        assert!(!is_name("has space"));
    }

    #[test]
    fn test_ncnames() {
        assert!(is_ncname("local"));
        assert!(!is_ncname("p:local"));
        assert!(check_ncname("a:b", "element").is_err());
        assert!(check_prefix("").is_ok());
        assert!(check_prefix("1p").is_err());
    }

    #[test]
    fn test_pi_target() {
        assert!(check_pi_target("xml-stylesheet").is_ok());
        assert!(check_pi_target("xml").is_err());
        assert!(check_pi_target("XmL").is_err());
        assert!(check_pi_target("").is_err());
    }

    #[test]
    fn test_entity_name() {
        assert!(check_entity_name("amp").is_ok());
        assert!(check_entity_name("#x20").is_err());
    }
}
