//! Path pattern filtering for search results
//!
//! A [`PathMatcher`] tests blob relative paths against a regular
//! expression. Matching is `search`-style: the pattern may land anywhere
//! in the path unless it anchors itself (or the matcher was built with
//! [`PathMatcher::anchored`]). Filtering is a lazy adaptor, so an upstream
//! streaming source is never collected first.

use crate::error::Result;
use crate::types::FlatBlob;
use regex::Regex;
use std::path::Path;

/// Regular-expression filter over blob relative paths.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: Regex,
}

impl PathMatcher {
    /// Compile `pattern`; it may match anywhere in a path.
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(PathMatcher {
            pattern: Regex::new(pattern)?,
        })
    }

    /// Compile `pattern` pinned to the start of the path.
    pub fn anchored(pattern: &str) -> Result<Self> {
        Ok(PathMatcher {
            pattern: Regex::new(&format!("^(?:{pattern})"))?,
        })
    }

    /// Test a path against the pattern.
    pub fn is_match(&self, path: &Path) -> bool {
        self.pattern.is_match(&path.to_string_lossy())
    }

    /// Test a blob's relative path against the pattern.
    pub fn matches(&self, blob: &FlatBlob) -> bool {
        self.is_match(&blob.path)
    }

    /// Lazily filter a blob stream down to matching entries.
    pub fn filter<'a>(
        &'a self,
        blobs: impl Iterator<Item = FlatBlob> + 'a,
    ) -> impl Iterator<Item = FlatBlob> + 'a {
        blobs.filter(move |b| self.matches(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlobKind, ObjectId};
    use std::path::PathBuf;

    fn blob(path: &str) -> FlatBlob {
        FlatBlob {
            id: ObjectId::parse(&"ab".repeat(20)).unwrap(),
            path: PathBuf::from(path),
            mode: 0o644,
            kind: BlobKind::Regular,
        }
    }

    #[test]
    fn test_matches_anywhere_in_path() {
        let matcher = PathMatcher::new(r"file\.txt$").unwrap();
        assert!(matcher.matches(&blob("a/b/file.txt")));
        assert!(matcher.matches(&blob("z/file.txt")));
        assert!(!matcher.matches(&blob("a/other.txt")));
        assert!(!matcher.matches(&blob("file.txt.bak")));
    }

    #[test]
    fn test_anchored_matches_from_path_start() {
        let search = PathMatcher::new("src/").unwrap();
        let anchored = PathMatcher::anchored("src/").unwrap();

        assert!(search.matches(&blob("vendor/src/lib.rs")));
        assert!(!anchored.matches(&blob("vendor/src/lib.rs")));
        assert!(anchored.matches(&blob("src/lib.rs")));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(PathMatcher::new("(unclosed").is_err());
    }

    #[test]
    fn test_filter_is_lazy() {
        let matcher = PathMatcher::new("keep").unwrap();
        let blobs = vec![blob("keep/one"), blob("drop/two"), blob("keep/three")];

        let mut filtered = matcher.filter(blobs.into_iter());
        assert_eq!(filtered.next().unwrap().path, PathBuf::from("keep/one"));
        assert_eq!(filtered.next().unwrap().path, PathBuf::from("keep/three"));
        assert!(filtered.next().is_none());
    }
}
