//! Writing expanded trees back onto a real filesystem
//!
//! A [`Materializer`] takes the flat blob list produced by the walker and
//! recreates it under a destination root: nested directories, regular file
//! content, permission bits reduced by the process umask, and symbolic
//! links whose target text is the blob's raw bytes.
//!
//! Failure policy: missing-ancestor creation failures abort the whole run
//! (a broken destination makes every later entry pointless), while
//! per-entry failures — an unreadable blob, a filesystem that refuses
//! symlinks, a path conflict — are logged, recorded in the report, and do
//! not stop the remaining entries. The caller decides whether a report
//! with warnings is acceptable.
//!
//! Re-running the same blob list into the same destination is idempotent
//! for regular files and directories (overwrite in place). An existing
//! symlink at a symlink destination is replaced; an existing non-symlink
//! there is a recorded [`PathConflict`](crate::VaultError::PathConflict),
//! never a silent deletion.

use crate::error::{Result, VaultError};
use crate::store::ObjectStoreClient;
use crate::types::{BlobKind, FlatBlob, MODE_PERM_MASK};
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, trace, warn};

/// Outcome of a materialization run.
#[derive(Debug, Clone, Default)]
pub struct MaterializeReport {
    /// Regular files written.
    pub files_written: usize,
    /// Symbolic links created.
    pub symlinks_created: usize,
    /// Total content bytes written.
    pub bytes_written: u64,
    /// Entries that failed without aborting the run.
    pub warnings: Vec<MaterializeWarning>,
}

impl MaterializeReport {
    /// True when every entry landed on disk.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: MaterializeReport) {
        self.files_written += other.files_written;
        self.symlinks_created += other.symlinks_created;
        self.bytes_written += other.bytes_written;
        self.warnings.extend(other.warnings);
    }
}

/// One entry that could not be materialized.
#[derive(Debug, Clone)]
pub struct MaterializeWarning {
    /// Destination path of the failed entry.
    pub path: PathBuf,
    /// Why it failed.
    pub reason: String,
}

/// Recreates expanded trees under a destination root.
pub struct Materializer<'s, S: ObjectStoreClient + ?Sized> {
    store: &'s S,
    umask: u32,
}

impl<'s, S: ObjectStoreClient + ?Sized> Materializer<'s, S> {
    /// A materializer using the current process umask.
    pub fn new(store: &'s S) -> Self {
        Materializer {
            store,
            umask: utils::process_umask(),
        }
    }

    /// A materializer with an explicit umask, for callers (and tests) that
    /// must not depend on ambient process state.
    pub fn with_umask(store: &'s S, umask: u32) -> Self {
        Materializer { store, umask }
    }

    /// Write `blobs` under `destination`, in the order supplied.
    ///
    /// Ancestor directories are created as needed; "already exists" is not
    /// an error, any other directory-creation failure is and aborts the
    /// run with [`Materialization`](crate::VaultError::Materialization).
    #[instrument(skip(self, blobs), fields(count = blobs.len()))]
    pub fn materialize(&self, blobs: &[FlatBlob], destination: &Path) -> Result<MaterializeReport> {
        let mut report = MaterializeReport::default();

        for blob in blobs {
            let target = destination.join(&blob.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|source| VaultError::Materialization {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            let placed = match blob.kind {
                BlobKind::Symlink => self.place_symlink(blob, &target).map(|()| {
                    report.symlinks_created += 1;
                }),
                BlobKind::Regular => self.place_file(blob, &target).map(|written| {
                    report.files_written += 1;
                    report.bytes_written += written;
                }),
            };

            if let Err(e) = placed {
                warn!(path = %target.display(), error = %e, "entry not materialized");
                report.warnings.push(MaterializeWarning {
                    path: target,
                    reason: e.to_string(),
                });
            }
        }

        debug!(
            files = report.files_written,
            symlinks = report.symlinks_created,
            warnings = report.warnings.len(),
            "materialized"
        );
        Ok(report)
    }

    /// Create a symlink whose target is the blob's bytes, exactly.
    ///
    /// No trailing bytes are stripped: the store hands back the target
    /// text verbatim and a trailing newline in the blob is a trailing
    /// newline in the link.
    fn place_symlink(&self, blob: &FlatBlob, target: &Path) -> Result<()> {
        let link_text = self.store.read_blob(&blob.id)?;

        match fs::symlink_metadata(target) {
            Ok(existing) if existing.file_type().is_symlink() => {
                fs::remove_file(target).map_err(|source| VaultError::Materialization {
                    path: target.to_path_buf(),
                    source,
                })?;
            }
            Ok(_) => {
                return Err(VaultError::PathConflict {
                    path: target.to_path_buf(),
                });
            }
            Err(_) => {}
        }

        utils::symlink_from_bytes(&link_text, target).map_err(|source| {
            VaultError::Materialization {
                path: target.to_path_buf(),
                source,
            }
        })?;
        trace!(path = %target.display(), "symlink created");
        Ok(())
    }

    /// Write blob content and reduce its stored mode by the umask.
    ///
    /// The permission arithmetic is on the low nine bits only; type bits
    /// were consumed when the walker classified the blob.
    fn place_file(&self, blob: &FlatBlob, target: &Path) -> Result<u64> {
        let content = self.store.read_blob(&blob.id)?;
        fs::write(target, &content).map_err(|source| VaultError::Materialization {
            path: target.to_path_buf(),
            source,
        })?;

        let mode = (blob.mode & MODE_PERM_MASK) & !self.umask;
        utils::set_permissions(target, mode).map_err(|source| VaultError::Materialization {
            path: target.to_path_buf(),
            source,
        })?;
        trace!(path = %target.display(), mode = %format_args!("{mode:03o}"), "file written");
        Ok(content.len() as u64)
    }
}
