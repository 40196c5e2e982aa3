//! Recursive tree expansion with shared-subtree memoization
//!
//! A [`TreeWalker`] turns a tree object id into the flat list of blobs
//! reachable from it. Expansion is a pure function of the object id —
//! content addressing guarantees that an identical id means byte-identical
//! contents and descendant structure — so each distinct subtree is expanded
//! at most once per cache lifetime and the result is reused for every
//! occurrence, in every root, with only the path prefix differing.
//!
//! Total work is proportional to the number of distinct objects reachable,
//! not the number of paths, which is what makes searching thousands of
//! commits that share most of their trees tractable.
//!
//! # Examples
//!
//! ```rust,no_run
//! use gitvault::store::{GitStore, ObjectStoreClient};
//! use gitvault::walker::TreeWalker;
//!
//! # fn main() -> gitvault::Result<()> {
//! let store = GitStore::new(".");
//! let head = store.resolve_ref("HEAD")?;
//! let walker = TreeWalker::new(&store);
//! for blob in walker.expand(&head)? {
//!     println!("{} {}", blob.id, blob.path.display());
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::store::ObjectStoreClient;
use crate::types::{BlobKind, FlatBlob, ObjectId, ObjectKind, MODE_PERM_MASK};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{instrument, trace};

/// Cache of completed subtree expansions, keyed by tree object id.
///
/// Entries hold blob paths relative to that subtree's own root; callers
/// re-prefix them with the entry name the subtree was reached through.
/// The map is write-once per key: the first completed expansion wins and
/// later writers discard their duplicate work. That makes concurrent
/// expansion of sibling subtrees safe without any further locking — a
/// race costs duplicate work, never an incorrect result.
///
/// The cache is explicitly constructed and explicitly shared (it clones
/// cheaply), so repeated invocations in one process neither leak nor
/// collide through ambient global state.
#[derive(Debug, Clone, Default)]
pub struct WalkCache {
    inner: Arc<DashMap<ObjectId, Arc<[FlatBlob]>>>,
}

impl WalkCache {
    /// An empty cache.
    pub fn new() -> Self {
        WalkCache::default()
    }

    /// Number of distinct subtrees cached so far.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when nothing has been expanded yet.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn get(&self, id: &ObjectId) -> Option<Arc<[FlatBlob]>> {
        self.inner.get(id).map(|hit| hit.clone())
    }

    /// Insert unless a concurrent expansion got there first; either way,
    /// return the entry that ended up in the cache.
    fn insert_first(&self, id: ObjectId, blobs: Vec<FlatBlob>) -> Arc<[FlatBlob]> {
        self.inner
            .entry(id)
            .or_insert_with(|| Arc::from(blobs))
            .clone()
    }
}

/// Depth-first tree expansion over an [`ObjectStoreClient`].
pub struct TreeWalker<'s, S: ObjectStoreClient + ?Sized> {
    store: &'s S,
    cache: WalkCache,
}

impl<'s, S: ObjectStoreClient + ?Sized> TreeWalker<'s, S> {
    /// A walker with its own fresh cache.
    pub fn new(store: &'s S) -> Self {
        TreeWalker {
            store,
            cache: WalkCache::new(),
        }
    }

    /// A walker sharing an existing cache, so several roots (or several
    /// walkers) reuse each other's completed subtrees.
    pub fn with_cache(store: &'s S, cache: WalkCache) -> Self {
        TreeWalker { store, cache }
    }

    /// The cache backing this walker.
    pub fn cache(&self) -> &WalkCache {
        &self.cache
    }

    /// Expand `root` into the flat list of blobs reachable from it.
    ///
    /// Entries are emitted in the order the store returns them, with a
    /// subtree's descendants emitted at the point of the subtree entry.
    /// The walker never reorders; callers needing a canonical order must
    /// sort explicitly.
    ///
    /// An empty tree yields an empty list. Any subtree that cannot be
    /// listed fails the whole expansion with
    /// [`ObjectUnreadable`](crate::VaultError::ObjectUnreadable) — no
    /// partial result is returned. Callers scanning many roots catch the
    /// per-root failure and move on.
    #[instrument(skip(self), level = "debug")]
    pub fn expand(&self, root: &ObjectId) -> Result<Vec<FlatBlob>> {
        Ok(self.expand_cached(root)?.to_vec())
    }

    fn expand_cached(&self, id: &ObjectId) -> Result<Arc<[FlatBlob]>> {
        if let Some(hit) = self.cache.get(id) {
            trace!(tree = %id.short(), blobs = hit.len(), "cache hit");
            return Ok(hit);
        }

        let entries = self.store.list_tree(id)?;
        let mut blobs = Vec::new();
        for entry in entries {
            match entry.kind {
                ObjectKind::Blob => {
                    let kind = if entry.is_symlink() {
                        BlobKind::Symlink
                    } else {
                        BlobKind::Regular
                    };
                    blobs.push(FlatBlob {
                        id: entry.target,
                        path: PathBuf::from(&entry.name),
                        mode: entry.mode & MODE_PERM_MASK,
                        kind,
                    });
                }
                ObjectKind::Tree => {
                    let subtree = self.expand_cached(&entry.target)?;
                    blobs.extend(subtree.iter().map(|b| b.prefixed(&entry.name)));
                }
            }
        }

        trace!(tree = %id.short(), blobs = blobs.len(), "expanded");
        Ok(self.cache.insert_first(id.clone(), blobs))
    }
}
