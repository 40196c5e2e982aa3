//! Object store access for gitvault
//!
//! The engine never touches the object database directly; every query goes
//! through the [`ObjectStoreClient`] trait. Two implementations live here:
//!
//! - [`GitStore`] shells out to the `git` binary, one short-lived process
//!   per query (`ls-tree -z`, `cat-file blob`, `rev-parse --verify`,
//!   `for-each-ref`, `log --format=%H`).
//! - [`MemoryStore`] keeps trees, blobs, and refs in hash maps and counts
//!   `list_tree` invocations, which is the seam the traversal tests hook
//!   into.
//!
//! All operations are synchronous and may block on child-process I/O. A
//! hung external process hangs the caller; there are no timeouts.

use crate::error::{Result, VaultError};
use crate::types::{ObjectId, ObjectKind, Ref, TreeEntry};
use dashmap::DashMap;
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, trace};

/// Narrow interface to a content-addressed object store.
///
/// Implementations resolve refs, enumerate tree entries, and fetch blob
/// bytes. Failures carry the implicated object id or ref name so callers
/// can report precisely what could not be read.
pub trait ObjectStoreClient {
    /// List the immediate entries of a tree object, in store order.
    ///
    /// `id` may be anything the store can peel to a tree (a tree id or a
    /// commit id). Fails with [`VaultError::ObjectUnreadable`] when the
    /// store cannot resolve `id` or the query process fails.
    fn list_tree(&self, id: &ObjectId) -> Result<Vec<TreeEntry>>;

    /// Fetch the raw bytes of a blob object.
    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>>;

    /// Resolve a ref name to the commit it points at.
    fn resolve_ref(&self, name: &str) -> Result<ObjectId>;

    /// Enumerate all refs and the commits they point at.
    fn list_refs(&self) -> Result<Vec<Ref>>;

    /// Commit ids reachable from `start`, reverse-chronological, excluding
    /// `start`'s own commit.
    ///
    /// The sequence is lazy: history is streamed as consumed, so a
    /// repository with an arbitrarily long history never has its whole id
    /// list buffered.
    fn commit_history(&self, start: &str) -> Result<CommitHistory>;
}

/// Lazy sequence of commit ids produced by [`ObjectStoreClient::commit_history`].
pub struct CommitHistory {
    inner: Box<dyn Iterator<Item = Result<ObjectId>> + Send>,
}

impl CommitHistory {
    /// Wrap an arbitrary id iterator.
    pub fn new(inner: impl Iterator<Item = Result<ObjectId>> + Send + 'static) -> Self {
        CommitHistory {
            inner: Box::new(inner),
        }
    }

    /// A history backed by an already-known list of ids.
    pub fn from_ids(ids: Vec<ObjectId>) -> Self {
        CommitHistory::new(ids.into_iter().map(Ok))
    }
}

impl Iterator for CommitHistory {
    type Item = Result<ObjectId>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl std::fmt::Debug for CommitHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CommitHistory(..)")
    }
}

/// Object store client that shells out to the `git` binary.
///
/// Each query runs `git -C <dir> …` and captures its output; a non-zero
/// exit or a spawn failure becomes the typed error of the operation that
/// issued it.
#[derive(Debug, Clone)]
pub struct GitStore {
    dir: PathBuf,
}

impl GitStore {
    /// A store rooted at the repository working directory `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        GitStore { dir: dir.into() }
    }

    /// The working directory queries run against.
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.dir).args(args);
        cmd
    }

    /// Run a git query and capture stdout; failure is summarized as text
    /// for the caller to wrap in the appropriate error variant.
    fn query(&self, args: &[&str]) -> std::result::Result<Vec<u8>, String> {
        trace!(?args, "git query");
        let output = self
            .command(args)
            .output()
            .map_err(|e| format!("could not run git: {e}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "git {} exited with {}: {}",
                args.first().unwrap_or(&"?"),
                output.status,
                stderr.trim()
            ));
        }
        Ok(output.stdout)
    }
}

impl ObjectStoreClient for GitStore {
    fn list_tree(&self, id: &ObjectId) -> Result<Vec<TreeEntry>> {
        let raw = self
            .query(&["ls-tree", "-z", id.as_str()])
            .map_err(|reason| VaultError::unreadable(id.clone(), reason))?;
        parse_ls_tree(&raw, id)
    }

    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        self.query(&["cat-file", "blob", id.as_str()])
            .map_err(|reason| VaultError::unreadable(id.clone(), reason))
    }

    fn resolve_ref(&self, name: &str) -> Result<ObjectId> {
        let raw = self
            .query(&["rev-parse", "--verify", name])
            .map_err(|_| VaultError::RefNotFound(name.to_string()))?;
        let text = String::from_utf8_lossy(&raw);
        ObjectId::parse(text.trim()).map_err(|_| VaultError::RefNotFound(name.to_string()))
    }

    fn list_refs(&self) -> Result<Vec<Ref>> {
        let raw = self
            .query(&["for-each-ref", "--format=%(objectname) %(refname)"])
            .map_err(|reason| VaultError::external_tool("git", reason))?;
        let text = String::from_utf8_lossy(&raw);
        let mut refs = Vec::new();
        for line in text.lines() {
            let Some((id, name)) = line.split_once(' ') else {
                continue;
            };
            refs.push(Ref {
                id: ObjectId::parse(id)?,
                name: name.to_string(),
            });
        }
        debug!(count = refs.len(), "enumerated refs");
        Ok(refs)
    }

    fn commit_history(&self, start: &str) -> Result<CommitHistory> {
        let mut child = self
            .command(&["log", "--format=%H", start])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VaultError::external_tool("git", format!("could not spawn git log: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VaultError::external_tool("git", "no stdout pipe from git log"))?;
        Ok(CommitHistory::new(GitHistory {
            lines: BufReader::new(stdout).lines(),
            child: Some(child),
            start: start.to_string(),
            skipped_head: false,
        }))
    }
}

/// Streaming iterator over `git log --format=%H` output.
///
/// The first line is the starting commit itself and is skipped. The child
/// is reaped when the stream drains and killed if the iterator is dropped
/// early.
struct GitHistory {
    lines: std::io::Lines<BufReader<ChildStdout>>,
    child: Option<Child>,
    start: String,
    skipped_head: bool,
}

impl Iterator for GitHistory {
    type Item = Result<ObjectId>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if !self.skipped_head {
                        self.skipped_head = true;
                        continue;
                    }
                    return Some(ObjectId::parse(line));
                }
                Some(Err(e)) => {
                    return Some(Err(VaultError::external_tool(
                        "git",
                        format!("reading git log output: {e}"),
                    )));
                }
                None => {
                    if let Some(mut child) = self.child.take() {
                        match child.wait() {
                            Ok(status) if !status.success() => {
                                return Some(Err(VaultError::RefNotFound(self.start.clone())));
                            }
                            Err(e) => {
                                return Some(Err(VaultError::external_tool("git", e.to_string())));
                            }
                            Ok(_) => {}
                        }
                    }
                    return None;
                }
            }
        }
    }
}

impl Drop for GitHistory {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Parse `ls-tree -z` output: NUL-separated records of
/// `<mode> <type> <id>\t<name>`.
///
/// Entry names may contain spaces, so the name is split off at the TAB
/// before the header is tokenized. Records whose type is neither `tree`
/// nor `blob` (gitlinks for submodules) are skipped.
pub(crate) fn parse_ls_tree(raw: &[u8], id: &ObjectId) -> Result<Vec<TreeEntry>> {
    let text = String::from_utf8_lossy(raw);
    let mut entries = Vec::new();
    for record in text.split('\0') {
        if record.is_empty() {
            continue;
        }
        let Some((header, name)) = record.split_once('\t') else {
            return Err(VaultError::unreadable(
                id.clone(),
                format!("malformed tree record {record:?}"),
            ));
        };
        let mut fields = header.split_whitespace();
        let (Some(mode), Some(otype), Some(target)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(VaultError::unreadable(
                id.clone(),
                format!("malformed tree record {record:?}"),
            ));
        };
        let mode = u32::from_str_radix(mode, 8).map_err(|_| {
            VaultError::unreadable(id.clone(), format!("bad mode {mode:?} in tree record"))
        })?;
        let kind = match otype {
            "tree" => ObjectKind::Tree,
            "blob" => ObjectKind::Blob,
            other => {
                trace!(kind = other, name, "skipping non-tree, non-blob entry");
                continue;
            }
        };
        entries.push(TreeEntry {
            name: name.to_string(),
            mode,
            kind,
            target: ObjectId::parse(target)?,
        });
    }
    Ok(entries)
}

/// In-memory object store for tests and offline tooling.
///
/// Trees, blobs, refs, and per-ref histories are registered up front.
/// A commit id can be registered as a tree directly, mirroring how the
/// real store peels a commit to its root tree. Every `list_tree` call is
/// counted per id so tests can assert the walker's memoization invariant.
#[derive(Debug, Default)]
pub struct MemoryStore {
    trees: HashMap<ObjectId, Vec<TreeEntry>>,
    blobs: HashMap<ObjectId, Vec<u8>>,
    refs: Vec<Ref>,
    histories: HashMap<String, Vec<ObjectId>>,
    list_tree_calls: DashMap<ObjectId, usize>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Register a tree object with its entries.
    pub fn add_tree(&mut self, id: ObjectId, entries: Vec<TreeEntry>) {
        self.trees.insert(id, entries);
    }

    /// Register a blob object with its content.
    pub fn add_blob(&mut self, id: ObjectId, bytes: impl Into<Vec<u8>>) {
        self.blobs.insert(id, bytes.into());
    }

    /// Register a ref pointing at `id`.
    pub fn add_ref(&mut self, name: impl Into<String>, id: ObjectId) {
        self.refs.push(Ref {
            id,
            name: name.into(),
        });
    }

    /// Register the commit history behind `start` (head excluded).
    pub fn add_history(&mut self, start: impl Into<String>, ids: Vec<ObjectId>) {
        self.histories.insert(start.into(), ids);
    }

    /// How many times `list_tree` was called for `id`.
    pub fn list_tree_calls(&self, id: &ObjectId) -> usize {
        self.list_tree_calls.get(id).map(|c| *c).unwrap_or(0)
    }

    /// Total `list_tree` calls across all ids.
    pub fn total_list_tree_calls(&self) -> usize {
        self.list_tree_calls.iter().map(|c| *c.value()).sum()
    }
}

impl ObjectStoreClient for MemoryStore {
    fn list_tree(&self, id: &ObjectId) -> Result<Vec<TreeEntry>> {
        *self.list_tree_calls.entry(id.clone()).or_insert(0) += 1;
        self.trees
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::unreadable(id.clone(), "no such tree in store"))
    }

    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        self.blobs
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::unreadable(id.clone(), "no such blob in store"))
    }

    fn resolve_ref(&self, name: &str) -> Result<ObjectId> {
        self.refs
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.id.clone())
            .ok_or_else(|| VaultError::RefNotFound(name.to_string()))
    }

    fn list_refs(&self) -> Result<Vec<Ref>> {
        Ok(self.refs.clone())
    }

    fn commit_history(&self, start: &str) -> Result<CommitHistory> {
        match self.histories.get(start) {
            Some(ids) => Ok(CommitHistory::from_ids(ids.clone())),
            None => Ok(CommitHistory::from_ids(Vec::new())),
        }
    }
}
