use anyhow::{
    Error,
    Result,
};

use crate::core::{
    hash::HashMap,
    match_style::MatchStyle,
    uri::{
        Uri,
        WildcardUri,
    },
};

/// Parses a subscription or registration pattern under the given match
/// style. Wildcard patterns permit empty components; exact and prefix
/// patterns must be strict URIs.
pub fn parse_pattern(uri: &str, style: Option<MatchStyle>) -> Result<WildcardUri> {
    match style {
        Some(MatchStyle::Wildcard) => WildcardUri::try_from(uri).map_err(Error::new),
        _ => Uri::try_from(uri).map(WildcardUri::from).map_err(Error::new),
    }
}

/// A trie over dot-separated URI components.
///
/// Each level of the trie corresponds to one URI component, so every pattern
/// starting with `com`, for example, hangs off the same edge. Prefix-style
/// subscriptions and registrations live in one of these: a lookup walks the
/// components of an incoming URI and collects the entry stored at every node
/// along the path.
#[derive(Debug)]
pub struct UriTrie<T> {
    root: TrieNode<T>,
}

#[derive(Debug)]
struct TrieNode<T> {
    edges: HashMap<String, TrieNode<T>>,
    entry: Option<T>,
}

impl<T> Default for TrieNode<T> {
    fn default() -> Self {
        Self {
            edges: HashMap::default(),
            entry: None,
        }
    }
}

impl<T> Default for UriTrie<T> {
    fn default() -> Self {
        Self {
            root: TrieNode::default(),
        }
    }
}

impl<T> UriTrie<T> {
    fn node(&self, pattern: &WildcardUri) -> Option<&TrieNode<T>> {
        let mut node = &self.root;
        for component in pattern.split() {
            node = node.edges.get(component)?;
        }
        Some(node)
    }

    /// The entry stored for exactly this pattern.
    pub fn get(&self, pattern: &WildcardUri) -> Option<&T> {
        self.node(pattern).and_then(|node| node.entry.as_ref())
    }

    /// Stores an entry for the pattern, returning the previous entry if one
    /// existed.
    pub fn insert(&mut self, pattern: &WildcardUri, value: T) -> Option<T> {
        let mut node = &mut self.root;
        for component in pattern.split() {
            node = node.edges.entry(component.to_owned()).or_default();
        }
        node.entry.replace(value)
    }

    /// Removes the entry for the pattern, pruning edges that no longer lead
    /// anywhere.
    pub fn remove(&mut self, pattern: &WildcardUri) -> Option<T> {
        let components = pattern.split().collect::<Vec<_>>();
        Self::remove_at(&mut self.root, &components)
    }

    fn remove_at(node: &mut TrieNode<T>, components: &[&str]) -> Option<T> {
        match components.split_first() {
            None => node.entry.take(),
            Some((component, rest)) => {
                let child = node.edges.get_mut(*component)?;
                let removed = Self::remove_at(child, rest);
                if child.entry.is_none() && child.edges.is_empty() {
                    node.edges.remove(*component);
                }
                removed
            }
        }
    }

    /// Collects the entries whose patterns are component-aligned prefixes of
    /// the URI, in shortest-prefix-first order. A pattern equal to the URI
    /// matches itself.
    pub fn matches(&self, uri: &Uri) -> Vec<&T> {
        let mut matches = Vec::new();
        let mut node = &self.root;
        if let Some(entry) = &node.entry {
            matches.push(entry);
        }
        for component in uri.split() {
            node = match node.edges.get(component) {
                Some(node) => node,
                None => return matches,
            };
            if let Some(entry) = &node.entry {
                matches.push(entry);
            }
        }
        matches
    }

    /// Does any stored pattern overlap this one, in the sense that some URI
    /// would be a match for both?
    ///
    /// For prefix patterns this means one pattern is a component-aligned
    /// prefix of the other.
    pub fn overlaps(&self, pattern: &WildcardUri) -> bool {
        let mut node = &self.root;
        if node.entry.is_some() {
            return true;
        }
        for component in pattern.split() {
            node = match node.edges.get(component) {
                Some(node) => node,
                None => return false,
            };
            if node.entry.is_some() {
                return true;
            }
        }
        Self::subtree_has_entry(node)
    }

    fn subtree_has_entry(node: &TrieNode<T>) -> bool {
        node.edges
            .values()
            .any(|child| child.entry.is_some() || Self::subtree_has_entry(child))
    }

}

/// Does the wildcard pattern match the URI? The pattern matches when both
/// have the same number of components and every non-empty pattern component
/// equals the corresponding URI component.
pub fn wildcard_matches(pattern: &WildcardUri, uri: &Uri) -> bool {
    let pattern = pattern.split().collect::<Vec<_>>();
    let uri = uri.split().collect::<Vec<_>>();
    pattern.len() == uri.len()
        && pattern
            .iter()
            .zip(uri.iter())
            .all(|(pattern, uri)| pattern.is_empty() || pattern == uri)
}

/// Do two wildcard patterns overlap, in the sense that some URI would match
/// both?
pub fn wildcard_patterns_overlap(a: &WildcardUri, b: &WildcardUri) -> bool {
    let a = a.split().collect::<Vec<_>>();
    let b = b.split().collect::<Vec<_>>();
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(a, b)| a.is_empty() || b.is_empty() || a == b)
}

#[cfg(test)]
mod pattern_test {
    use crate::{
        core::uri::{
            Uri,
            WildcardUri,
        },
        router::pattern::{
            UriTrie,
            wildcard_matches,
            wildcard_patterns_overlap,
        },
    };

    fn uri(value: &str) -> Uri {
        Uri::try_from(value).unwrap()
    }

    fn pattern(value: &str) -> WildcardUri {
        WildcardUri::try_from(value).unwrap()
    }

    #[test]
    fn collects_prefix_matches_along_path() {
        let mut trie = UriTrie::default();
        trie.insert(&pattern("com"), 1);
        trie.insert(&pattern("com.example"), 2);
        trie.insert(&pattern("com.example.test"), 3);
        trie.insert(&pattern("org.example"), 4);

        assert_eq!(
            trie.matches(&uri("com.example.test.topic")),
            vec![&1, &2, &3]
        );
        assert_eq!(trie.matches(&uri("com.example")), vec![&1, &2]);
        assert_eq!(trie.matches(&uri("org.example")), vec![&4]);
        assert_eq!(trie.matches(&uri("net.example")), Vec::<&i32>::new());
    }

    #[test]
    fn removes_and_prunes() {
        let mut trie = UriTrie::default();
        trie.insert(&pattern("com.example.test"), 1);
        trie.insert(&pattern("com.example"), 2);

        assert_eq!(trie.remove(&pattern("com.example.test")), Some(1));
        assert_eq!(trie.remove(&pattern("com.example.test")), None);
        assert_eq!(trie.matches(&uri("com.example.test.topic")), vec![&2]);

        assert_eq!(trie.remove(&pattern("com.example")), Some(2));
        assert_eq!(
            trie.matches(&uri("com.example.test.topic")),
            Vec::<&i32>::new()
        );
    }

    #[test]
    fn detects_nested_prefix_overlap() {
        let mut trie = UriTrie::default();
        trie.insert(&pattern("com.example"), 1);

        assert!(trie.overlaps(&pattern("com.example")));
        assert!(trie.overlaps(&pattern("com.example.test")));
        assert!(trie.overlaps(&pattern("com")));
        assert!(!trie.overlaps(&pattern("com.other")));
        assert!(!trie.overlaps(&pattern("org")));
    }

    #[test]
    fn matches_wildcards_componentwise() {
        assert!(wildcard_matches(&pattern("a..c"), &uri("a.b.c")));
        assert!(wildcard_matches(&pattern("a.b.c"), &uri("a.b.c")));
        assert!(wildcard_matches(&pattern(".."), &uri("a.b.c")));
        assert!(!wildcard_matches(&pattern("a..c"), &uri("a.b.d")));
        assert!(!wildcard_matches(&pattern("a..c"), &uri("a.b.c.d")));
        assert!(!wildcard_matches(&pattern("a..c.d"), &uri("a.b.c")));
    }

    #[test]
    fn detects_wildcard_overlap() {
        assert!(wildcard_patterns_overlap(&pattern("a..c"), &pattern("a.b.")));
        assert!(wildcard_patterns_overlap(&pattern("a..c"), &pattern("a..c")));
        assert!(!wildcard_patterns_overlap(&pattern("a..c"), &pattern("b..c")));
        assert!(!wildcard_patterns_overlap(&pattern("a..c"), &pattern("a.b")));
    }

}
