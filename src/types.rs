//! Core data types shared across the gitvault engine
//!
//! Everything the traversal and materialization engine passes around lives
//! here: content-hash object identifiers, raw tree entries as the store
//! reports them, and the flattened blob records produced by expansion.

use crate::error::{Result, VaultError};
use std::fmt;
use std::path::{Path, PathBuf};

/// Raw mode value the object store uses for symbolic links.
pub const MODE_SYMLINK: u32 = 0o120000;

/// Mask selecting the permission-relevant bits of a mode.
pub const MODE_PERM_MASK: u32 = 0o777;

/// Mask selecting the object-type bits of a mode.
const MODE_TYPE_MASK: u32 = 0o170000;

/// Content hash identifying a tree or blob in the object store.
///
/// Object ids are opaque fixed-format hex digests: 40 characters for SHA-1
/// stores, 64 for SHA-256 stores. Two identical contents anywhere in history
/// share one `ObjectId` — the content-addressing invariant everything in the
/// walker's cache relies on.
///
/// # Examples
///
/// ```rust
/// use gitvault::types::ObjectId;
///
/// let id = ObjectId::parse("a94a8fe5ccb19ba61c4c0873d391e987982fbbd3").unwrap();
/// assert_eq!(id.short(), "a94a8fe5");
/// assert!(ObjectId::parse("not-a-hash").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse a hex digest into an `ObjectId`.
    ///
    /// Accepts 40- or 64-character hex; the stored form is normalized to
    /// lowercase.
    pub fn parse(hex_digest: &str) -> Result<Self> {
        let digest = hex_digest.trim();
        if digest.len() != 40 && digest.len() != 64 {
            return Err(VaultError::InvalidObjectId(digest.to_string()));
        }
        if hex::decode(digest).is_err() {
            return Err(VaultError::InvalidObjectId(digest.to_string()));
        }
        Ok(ObjectId(digest.to_ascii_lowercase()))
    }

    /// The full hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated digest for log lines and progress output.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        ObjectId::parse(s)
    }
}

/// What kind of object a tree entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A subdirectory.
    Tree,
    /// File content or symlink target text.
    Blob,
}

/// One record of a tree object, exactly as the store reports it.
///
/// `mode` carries the store's raw mode bits (type and permissions combined,
/// e.g. `0o100644` or `0o120000`); the walker splits those apart when it
/// produces [`FlatBlob`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path segment within the parent tree.
    pub name: String,
    /// Raw mode bits from the store.
    pub mode: u32,
    /// Whether the target is a tree or a blob.
    pub kind: ObjectKind,
    /// Id of the child object.
    pub target: ObjectId,
}

impl TreeEntry {
    /// True when the raw mode marks this entry as a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_SYMLINK
    }
}

/// Whether a flattened blob is a regular file or a symlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    /// Ordinary file content.
    Regular,
    /// The blob bytes are the symlink target text.
    Symlink,
}

/// A blob reached by fully expanding a tree.
///
/// `path` is relative to the expansion root; `mode` is truncated to the low
/// nine permission bits, with the type information carried in `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatBlob {
    /// Content id of the blob.
    pub id: ObjectId,
    /// Path relative to the root the expansion started from.
    pub path: PathBuf,
    /// Permission bits only (`mode & 0o777`).
    pub mode: u32,
    /// Regular file or symlink.
    pub kind: BlobKind,
}

impl FlatBlob {
    /// The same blob with `prefix` prepended to its relative path.
    ///
    /// Used when a cached subtree expansion is re-emitted under the entry
    /// name it was reached through.
    pub fn prefixed(&self, prefix: &str) -> FlatBlob {
        FlatBlob {
            id: self.id.clone(),
            path: Path::new(prefix).join(&self.path),
            mode: self.mode,
            kind: self.kind,
        }
    }
}

/// A named pointer into the store's commit history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ref {
    /// Commit the ref currently points at.
    pub id: ObjectId,
    /// Fully qualified ref name, e.g. `refs/heads/master`.
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA1: &str = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";

    #[test]
    fn test_object_id_parse() {
        let id = ObjectId::parse(SHA1).unwrap();
        assert_eq!(id.as_str(), SHA1);
        assert_eq!(id.short(), "a94a8fe5");

        // SHA-256 length is also accepted
        let sha256 = "b".repeat(64);
        assert!(ObjectId::parse(&sha256).is_ok());

        // Uppercase input normalizes to lowercase
        let upper = ObjectId::parse(&SHA1.to_ascii_uppercase()).unwrap();
        assert_eq!(upper.as_str(), SHA1);
    }

    #[test]
    fn test_object_id_rejects_garbage() {
        assert!(ObjectId::parse("").is_err());
        assert!(ObjectId::parse("abc123").is_err());
        assert!(ObjectId::parse(&"g".repeat(40)).is_err());
        assert!(ObjectId::parse(&"a".repeat(41)).is_err());
    }

    #[test]
    fn test_symlink_mode_detection() {
        let entry = TreeEntry {
            name: "link".to_string(),
            mode: 0o120000,
            kind: ObjectKind::Blob,
            target: ObjectId::parse(SHA1).unwrap(),
        };
        assert!(entry.is_symlink());

        let file = TreeEntry {
            mode: 0o100644,
            ..entry.clone()
        };
        assert!(!file.is_symlink());
    }

    #[test]
    fn test_flat_blob_prefixing() {
        let blob = FlatBlob {
            id: ObjectId::parse(SHA1).unwrap(),
            path: PathBuf::from("b/file.txt"),
            mode: 0o644,
            kind: BlobKind::Regular,
        };
        let prefixed = blob.prefixed("a");
        assert_eq!(prefixed.path, PathBuf::from("a/b/file.txt"));
        assert_eq!(prefixed.id, blob.id);
        assert_eq!(prefixed.mode, 0o644);
    }
}
