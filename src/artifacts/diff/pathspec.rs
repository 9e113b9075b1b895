//! Path restriction for tree comparisons
//!
//! A pathspec is a set of slash-separated prefixes. A path matches when it
//! equals a prefix or lies below one; a directory is worth descending into
//! when it matches or when a prefix lies below it.

use bstr::{BString, ByteSlice};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pathspec {
    trie: Trie,
}

impl Pathspec {
    /// Matches every path
    pub fn all() -> Self {
        Self {
            trie: Trie::with_matching(true),
        }
    }

    pub fn new<S: AsRef<[u8]>>(prefixes: impl IntoIterator<Item = S>) -> Self {
        let mut trie = Trie::default();
        let mut any = false;
        for prefix in prefixes {
            let components: Vec<&[u8]> = prefix
                .as_ref()
                .split_str("/")
                .filter(|component| !component.is_empty())
                .collect();
            trie.insert(&components);
            any = true;
        }

        if any { Self { trie } } else { Self::all() }
    }

    pub fn matches_all(&self) -> bool {
        self.trie.is_matching
    }

    /// Whether `path` itself is selected
    pub fn matches(&self, path: impl AsRef<[u8]>) -> bool {
        self.walk(path.as_ref()).is_some_and(|node| node.is_matching)
    }

    /// Whether anything under directory `path` can be selected
    pub fn may_contain(&self, path: impl AsRef<[u8]>) -> bool {
        self.walk(path.as_ref()).is_some()
    }

    fn walk(&self, path: &[u8]) -> Option<&Trie> {
        let mut node = &self.trie;
        for component in path.split_str("/") {
            if node.is_matching {
                return Some(node);
            }
            node = node.children.get(component.as_bstr())?;
        }
        Some(node)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Trie {
    is_matching: bool,
    children: HashMap<BString, Trie>,
}

impl Trie {
    fn with_matching(is_matching: bool) -> Self {
        Trie {
            is_matching,
            children: HashMap::new(),
        }
    }

    fn insert(&mut self, path: &[&[u8]]) {
        let mut node = self;
        for part in path {
            node = node.children.entry(BString::from(*part)).or_default();
        }
        node.is_matching = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("src", true)]
    #[case("src/main.rs", true)]
    #[case("src/deep/er.rs", true)]
    #[case("docs/guide.md", true)]
    #[case("docs/other.md", false)]
    #[case("srcs", false)]
    #[case("README", false)]
    fn prefixes_select_paths_below_them(#[case] path: &str, #[case] expected: bool) {
        let pathspec = Pathspec::new(["src", "docs/guide.md"]);
        assert_eq!(pathspec.matches(path), expected);
    }

    #[test]
    fn directories_above_a_prefix_are_descended() {
        let pathspec = Pathspec::new(["a/b/c.txt"]);

        assert!(pathspec.may_contain("a"));
        assert!(pathspec.may_contain("a/b"));
        assert!(!pathspec.matches("a/b"));
        assert!(!pathspec.may_contain("x"));
    }

    #[test]
    fn empty_pathspec_matches_everything() {
        let pathspec = Pathspec::new(Vec::<String>::new());

        assert!(pathspec.matches_all());
        assert!(pathspec.matches("anything/at/all"));
    }
}
