//! Searching history for files by path pattern
//!
//! The [`Searcher`] walks one tree, one ref, or every ref (optionally with
//! each ref's full commit history behind it) and collects the blobs whose
//! relative path matches a [`PathMatcher`]. Because commits overwhelmingly
//! share their trees, a single [`WalkCache`](crate::walker::WalkCache)
//! backs the whole scan and keeps the cost proportional to the number of
//! distinct objects, not the number of commits.
//!
//! Multi-root scans are best-effort: a root that cannot be expanded is
//! recorded and skipped, and the scan moves on to the next root. A single
//! explicitly requested tree fails hard instead.

use crate::error::{Result, VaultError};
use crate::materialize::Materializer;
use crate::matcher::PathMatcher;
use crate::store::ObjectStoreClient;
use crate::types::{FlatBlob, ObjectId};
use crate::walker::TreeWalker;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// What to scan and what to do with matches.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Scan only this ref instead of every ref.
    pub start_ref: Option<String>,
    /// Scan only this tree object; excludes ref options.
    pub start_tree: Option<ObjectId>,
    /// Follow each ref's complete commit history.
    pub all_history: bool,
    /// Also materialize each match under this directory, in a per-commit
    /// subdirectory.
    pub extract_to: Option<PathBuf>,
}

/// Where a match was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchSource {
    /// An explicitly supplied tree object.
    Tree(ObjectId),
    /// A commit, with whichever refs currently point at it (empty for
    /// commits reached through history).
    Commit {
        /// The commit id.
        id: ObjectId,
        /// Refs whose head this commit is.
        refs: Vec<String>,
    },
}

impl MatchSource {
    /// The underlying object id.
    pub fn id(&self) -> &ObjectId {
        match self {
            MatchSource::Tree(id) => id,
            MatchSource::Commit { id, .. } => id,
        }
    }
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchSource::Tree(id) => write!(f, "{id} ()"),
            MatchSource::Commit { id, refs } => write!(f, "{id} ({})", refs.join(",")),
        }
    }
}

/// One blob whose path matched the pattern.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    /// The root the blob was found under.
    pub source: MatchSource,
    /// The matching blob.
    pub blob: FlatBlob,
}

/// A root that could not be scanned during a best-effort sweep.
#[derive(Debug, Clone)]
pub struct SkippedRoot {
    /// Human-readable description of the root (commit id or ref name).
    pub descriptor: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Everything a search produced.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Matches across all scanned roots, in scan order.
    pub matches: Vec<SearchMatch>,
    /// Distinct roots successfully expanded.
    pub roots_scanned: usize,
    /// Roots skipped because they could not be expanded.
    pub skipped: Vec<SkippedRoot>,
}

/// Drives pattern search across trees, refs, and history.
pub struct Searcher<'s, S: ObjectStoreClient + ?Sized> {
    store: &'s S,
    walker: TreeWalker<'s, S>,
    materializer: Materializer<'s, S>,
    matcher: PathMatcher,
}

impl<'s, S: ObjectStoreClient + ?Sized> Searcher<'s, S> {
    /// A searcher over `store` filtering with `matcher`.
    pub fn new(store: &'s S, matcher: PathMatcher) -> Self {
        Searcher {
            store,
            walker: TreeWalker::new(store),
            materializer: Materializer::new(store),
            matcher,
        }
    }

    /// Run the search described by `options`.
    ///
    /// Option conflicts (ref together with tree, history without refs)
    /// are usage errors. Per-root expansion failures during a multi-root
    /// sweep land in [`SearchOutcome::skipped`].
    #[instrument(skip(self, options))]
    pub fn run(&self, options: &SearchOptions) -> Result<SearchOutcome> {
        if options.start_ref.is_some() && options.start_tree.is_some() {
            return Err(VaultError::usage(
                "a start ref and a start tree cannot both be given",
            ));
        }
        if options.all_history && options.start_tree.is_some() {
            return Err(VaultError::usage(
                "history search cannot start from a bare tree",
            ));
        }

        let mut outcome = SearchOutcome::default();

        if let Some(tree) = &options.start_tree {
            // A single explicit tree fails hard rather than best-effort.
            self.scan_root(MatchSource::Tree(tree.clone()), options, &mut outcome)?;
            return Ok(outcome);
        }

        let heads = self.collect_heads(options)?;
        let mut seen: HashSet<ObjectId> = HashSet::new();

        for (head, refs) in heads {
            if seen.insert(head.clone()) {
                let source = MatchSource::Commit {
                    id: head.clone(),
                    refs,
                };
                self.scan_best_effort(source, options, &mut outcome);
            }

            if options.all_history {
                self.scan_history(&head, &mut seen, options, &mut outcome)?;
            }
        }

        info!(
            matches = outcome.matches.len(),
            roots = outcome.roots_scanned,
            skipped = outcome.skipped.len(),
            "search finished"
        );
        Ok(outcome)
    }

    /// Head commits to scan, grouped with the refs pointing at them.
    fn collect_heads(&self, options: &SearchOptions) -> Result<Vec<(ObjectId, Vec<String>)>> {
        if let Some(name) = &options.start_ref {
            let id = self.store.resolve_ref(name)?;
            return Ok(vec![(id, vec![name.clone()])]);
        }

        let mut heads: Vec<(ObjectId, Vec<String>)> = Vec::new();
        for r in self.store.list_refs()? {
            match heads.iter_mut().find(|(id, _)| *id == r.id) {
                Some((_, names)) => names.push(r.name),
                None => heads.push((r.id, vec![r.name])),
            }
        }
        Ok(heads)
    }

    fn scan_history(
        &self,
        head: &ObjectId,
        seen: &mut HashSet<ObjectId>,
        options: &SearchOptions,
        outcome: &mut SearchOutcome,
    ) -> Result<()> {
        for commit in self.store.commit_history(head.as_str())? {
            match commit {
                Ok(id) => {
                    if !seen.insert(id.clone()) {
                        continue;
                    }
                    let source = MatchSource::Commit {
                        id,
                        refs: Vec::new(),
                    };
                    self.scan_best_effort(source, options, outcome);
                }
                Err(e) => {
                    warn!(head = %head.short(), error = %e, "history truncated");
                    outcome.skipped.push(SkippedRoot {
                        descriptor: format!("history of {head}"),
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }
        Ok(())
    }

    /// Scan one root, downgrading failure to a skip record.
    fn scan_best_effort(
        &self,
        source: MatchSource,
        options: &SearchOptions,
        outcome: &mut SearchOutcome,
    ) {
        let descriptor = source.id().to_string();
        if let Err(e) = self.scan_root(source, options, outcome) {
            warn!(root = %descriptor, error = %e, "root skipped");
            outcome.skipped.push(SkippedRoot {
                descriptor,
                reason: e.to_string(),
            });
        }
    }

    fn scan_root(
        &self,
        source: MatchSource,
        options: &SearchOptions,
        outcome: &mut SearchOutcome,
    ) -> Result<()> {
        let blobs = self.walker.expand(source.id())?;
        let matched: Vec<FlatBlob> = self
            .matcher
            .filter(blobs.into_iter())
            .collect();
        outcome.roots_scanned += 1;
        debug!(root = %source.id().short(), matched = matched.len(), "root scanned");

        if let Some(dest) = &options.extract_to {
            if !matched.is_empty() {
                let subdir = dest.join(source.id().as_str());
                let report = self.materializer.materialize(&matched, &subdir)?;
                for w in &report.warnings {
                    warn!(path = %w.path.display(), reason = %w.reason, "match not extracted");
                }
            }
        }

        outcome.matches.extend(
            matched
                .into_iter()
                .map(|blob| SearchMatch {
                    source: source.clone(),
                    blob,
                }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{ObjectKind, TreeEntry};

    fn oid(byte: u8) -> ObjectId {
        ObjectId::parse(&format!("{byte:02x}").repeat(20)).unwrap()
    }

    fn blob_entry(name: &str, target: ObjectId) -> TreeEntry {
        TreeEntry {
            name: name.to_string(),
            mode: 0o100644,
            kind: ObjectKind::Blob,
            target,
        }
    }

    fn matcher(pattern: &str) -> PathMatcher {
        PathMatcher::new(pattern).unwrap()
    }

    #[test]
    fn test_conflicting_options_rejected() {
        let store = MemoryStore::new();
        let searcher = Searcher::new(&store, matcher("x"));

        let both = SearchOptions {
            start_ref: Some("refs/heads/master".to_string()),
            start_tree: Some(oid(1)),
            ..Default::default()
        };
        assert!(matches!(
            searcher.run(&both),
            Err(VaultError::Usage(_))
        ));

        let history_of_tree = SearchOptions {
            start_tree: Some(oid(1)),
            all_history: true,
            ..Default::default()
        };
        assert!(matches!(
            searcher.run(&history_of_tree),
            Err(VaultError::Usage(_))
        ));
    }

    #[test]
    fn test_refs_sharing_a_head_are_grouped() {
        let mut store = MemoryStore::new();
        store.add_tree(oid(1), vec![blob_entry("file.txt", oid(2))]);
        store.add_ref("refs/heads/master", oid(1));
        store.add_ref("refs/tags/v1", oid(1));

        let searcher = Searcher::new(&store, matcher(r"file\.txt$"));
        let outcome = searcher.run(&SearchOptions::default()).unwrap();

        assert_eq!(outcome.roots_scanned, 1);
        assert_eq!(outcome.matches.len(), 1);
        let MatchSource::Commit { refs, .. } = &outcome.matches[0].source else {
            panic!("expected a commit source");
        };
        assert_eq!(refs, &["refs/heads/master", "refs/tags/v1"]);
    }

    #[test]
    fn test_broken_ref_is_skipped_not_fatal() {
        let mut store = MemoryStore::new();
        store.add_tree(oid(1), vec![blob_entry("file.txt", oid(2))]);
        store.add_ref("refs/heads/good", oid(1));
        // Ref pointing at a tree the store cannot list.
        store.add_ref("refs/heads/broken", oid(9));

        let searcher = Searcher::new(&store, matcher(r"file\.txt$"));
        let outcome = searcher.run(&SearchOptions::default()).unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].descriptor, oid(9).to_string());
    }

    #[test]
    fn test_explicit_tree_fails_hard() {
        let store = MemoryStore::new();
        let searcher = Searcher::new(&store, matcher("x"));
        let options = SearchOptions {
            start_tree: Some(oid(9)),
            ..Default::default()
        };
        assert!(matches!(
            searcher.run(&options),
            Err(VaultError::ObjectUnreadable { .. })
        ));
    }

    #[test]
    fn test_history_scanned_once_across_refs() {
        let mut store = MemoryStore::new();
        store.add_tree(oid(1), vec![blob_entry("new.txt", oid(2))]);
        store.add_tree(oid(3), vec![blob_entry("old.txt", oid(4))]);
        store.add_ref("refs/heads/a", oid(1));
        store.add_ref("refs/heads/b", oid(1));
        store.add_history(oid(1).as_str(), vec![oid(3)]);

        let searcher = Searcher::new(&store, matcher(r"\.txt$"));
        let options = SearchOptions {
            all_history: true,
            ..Default::default()
        };
        let outcome = searcher.run(&options).unwrap();

        // Head and one history commit, each scanned exactly once even
        // though two refs share the head.
        assert_eq!(outcome.roots_scanned, 2);
        assert_eq!(store.list_tree_calls(&oid(1)), 1);
        assert_eq!(store.list_tree_calls(&oid(3)), 1);

        let sources: Vec<_> = outcome
            .matches
            .iter()
            .map(|m| m.source.id().clone())
            .collect();
        assert_eq!(sources, vec![oid(1), oid(3)]);
    }

    #[test]
    fn test_descriptor_formatting() {
        let tree = MatchSource::Tree(oid(1));
        assert_eq!(tree.to_string(), format!("{} ()", oid(1)));

        let commit = MatchSource::Commit {
            id: oid(2),
            refs: vec!["refs/heads/a".to_string(), "refs/tags/b".to_string()],
        };
        assert_eq!(
            commit.to_string(),
            format!("{} (refs/heads/a,refs/tags/b)", oid(2))
        );
    }
}
