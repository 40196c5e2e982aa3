//! # gitvault - personal backup and time travel over git
//!
//! gitvault layers a backup/versioning toolkit on top of git's
//! content-addressed object store. It periodically snapshots a directory
//! tree into immutable, hash-addressed commits and ships the tools to
//! locate, extract, and compare historical file states.
//!
//! ## Overview
//!
//! The heart of the crate is the tree traversal and materialization
//! engine:
//!
//! - **Expansion**: [`TreeWalker`] recursively flattens a tree object into
//!   `(blob id, relative path, mode)` records, memoizing per subtree id so
//!   shared subtrees — the common case across thousands of mostly-identical
//!   backup commits — are expanded exactly once.
//! - **Materialization**: [`Materializer`] recreates a flattened tree on a
//!   real filesystem: nested directories, file content, permission bits
//!   reduced by the process umask, and symlinks whose target is the blob's
//!   raw bytes.
//! - **Search**: [`Searcher`] sweeps a tree, a ref, or every ref (plus
//!   full history on request) for paths matching a [`PathMatcher`]
//!   pattern, tolerating unreadable roots.
//! - **Comparison**: [`TreeDiffPresenter`] stages two historical trees in
//!   temporary directories and opens an external visual diff tool on them,
//!   cleaning up on every exit path.
//!
//! All object access goes through the [`ObjectStoreClient`] trait:
//! [`GitStore`] shells out to the git binary, and [`MemoryStore`] backs
//! the test suite.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use gitvault::{GitStore, PathMatcher, Searcher, SearchOptions};
//!
//! # fn main() -> gitvault::Result<()> {
//! let store = GitStore::new("/home/me");
//! let matcher = PathMatcher::new(r"\.config/.*\.toml$")?;
//! let searcher = Searcher::new(&store, matcher);
//!
//! let outcome = searcher.run(&SearchOptions {
//!     all_history: true,
//!     ..Default::default()
//! })?;
//! for m in &outcome.matches {
//!     println!("{} {} {}", m.source, m.blob.id, m.blob.path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Operations return `Result<T, VaultError>`. Every fatal condition names
//! the object id, ref, or path implicated; the CLI maps errors onto the
//! [`ExitCode`] classes.

pub mod backup;
pub mod compare;
pub mod error;
pub mod materialize;
pub mod matcher;
pub mod search;
pub mod store;
pub mod types;
pub mod walker;

mod utils;

pub use backup::Backup;
pub use compare::TreeDiffPresenter;
pub use error::{ExitCode, Result, VaultError};
pub use materialize::{MaterializeReport, Materializer};
pub use matcher::PathMatcher;
pub use search::{MatchSource, SearchMatch, SearchOptions, SearchOutcome, Searcher};
pub use store::{CommitHistory, GitStore, MemoryStore, ObjectStoreClient};
pub use types::*;
pub use utils::format_bytes;
pub use walker::{TreeWalker, WalkCache};
