//! Scoped prefix/URI table
//!
//! Frames share one table through an `Rc` until a frame needs a binding of
//! its own; `Rc::make_mut` then gives that frame a private copy, so parents
//! and siblings never observe the change.

/// Prefix/URI bindings visible in one scope, oldest first.
///
/// A later binding of a prefix masks earlier ones. An entry with an empty URI
/// undeclares its prefix (XML 1.1 only; callers enforce that).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NsMapping {
    pairs: Vec<(String, String)>,
}

impl NsMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// URI currently bound to `prefix`; `None` if unbound or undeclared
    pub fn find_uri(&self, prefix: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, u)| u.as_str())
            .filter(|u| !u.is_empty())
    }

    /// Most recent prefix whose current binding is `uri`
    pub fn find_prefix(&self, uri: &str) -> Option<&str> {
        if uri.is_empty() {
            return None;
        }
        self.pairs
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, (_, u))| u == uri)
            .map(|(i, (p, _))| (i, p.as_str()))
            .find(|&(i, p)| !self.pairs[i + 1..].iter().any(|(later, _)| later == p))
            .map(|(_, p)| p)
    }

    /// Is `prefix` mentioned at all, bound or undeclared?
    pub fn mentions(&self, prefix: &str) -> bool {
        self.pairs.iter().any(|(p, _)| p == prefix)
    }

    /// Bind `prefix` to `uri`, returning the URI it was bound to before
    pub fn bind(&mut self, prefix: &str, uri: &str) -> Option<String> {
        let previous = self.find_uri(prefix).map(str::to_string);
        self.pairs.push((prefix.to_string(), uri.to_string()));
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_bind_and_lookup() {
        let mut map = NsMapping::new();
        assert_eq!(map.bind("a", "urn:a"), None);
        assert_eq!(map.find_uri("a"), Some("urn:a"));
        assert_eq!(map.find_prefix("urn:a"), Some("a"));
        assert_eq!(map.find_prefix("urn:b"), None);
    }

    #[test]
    fn test_masking() {
        let mut map = NsMapping::new();
        map.bind("a", "urn:a");
        assert_eq!(map.bind("a", "urn:b").as_deref(), Some("urn:a"));
        assert_eq!(map.find_uri("a"), Some("urn:b"));
        // `a` no longer means urn:a
        assert_eq!(map.find_prefix("urn:a"), None);
        assert_eq!(map.find_prefix("urn:b"), Some("a"));
    }

    #[test]
    fn test_latest_prefix_wins_for_uri() {
        let mut map = NsMapping::new();
        map.bind("a", "urn:x");
        map.bind("b", "urn:x");
        assert_eq!(map.find_prefix("urn:x"), Some("b"));
        map.bind("b", "urn:y");
        assert_eq!(map.find_prefix("urn:x"), Some("a"));
    }

    #[test]
    fn test_undeclared_prefix() {
        let mut map = NsMapping::new();
        map.bind("a", "urn:a");
        map.bind("a", "");
        assert_eq!(map.find_uri("a"), None);
        assert_eq!(map.find_prefix("urn:a"), None);
        assert!(map.mentions("a"));
    }

    #[test]
    fn test_copy_on_write_isolation() {
        let mut parent = Rc::new(NsMapping::new());
        Rc::make_mut(&mut parent).bind("p", "urn:p");

        let mut child = Rc::clone(&parent);
        assert!(Rc::ptr_eq(&parent, &child));
        Rc::make_mut(&mut child).bind("c", "urn:c");

        assert!(!Rc::ptr_eq(&parent, &child));
        assert_eq!(parent.find_uri("c"), None);
        assert_eq!(child.find_uri("p"), Some("urn:p"));
    }
}
