//! Side-by-side comparison of two historical trees
//!
//! [`TreeDiffPresenter`] materializes two tree-ish objects into fresh
//! temporary directories and hands both paths to an external visual diff
//! tool. The tool's exit code is ignored — diff programs conventionally
//! exit non-zero to report "differences found" — and only a failure to
//! spawn it at all is an error.
//!
//! Both temporary directories are removed on every exit path: success,
//! tool failure, or a failed materialization. The `TempDir` guards own
//! that guarantee; the error paths simply drop them.

use crate::error::{Result, VaultError};
use crate::materialize::Materializer;
use crate::store::ObjectStoreClient;
use crate::types::ObjectId;
use crate::walker::TreeWalker;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, info, instrument};

/// Default external diff tool.
pub const DEFAULT_DIFF_TOOL: &str = "meld";

/// Materializes two roots and presents them to an external diff tool.
pub struct TreeDiffPresenter<'s, S: ObjectStoreClient + ?Sized> {
    store: &'s S,
    tool: String,
    temp_root: Option<PathBuf>,
}

impl<'s, S: ObjectStoreClient + ?Sized> TreeDiffPresenter<'s, S> {
    /// A presenter invoking [`DEFAULT_DIFF_TOOL`].
    pub fn new(store: &'s S) -> Self {
        TreeDiffPresenter {
            store,
            tool: DEFAULT_DIFF_TOOL.to_string(),
            temp_root: None,
        }
    }

    /// Use a different diff program.
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Create the scratch directories under `root` instead of the system
    /// temp location (useful when the trees are large, or to observe
    /// cleanup in tests).
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Materialize `root_a` and `root_b` and run the diff tool on them.
    ///
    /// The two materializations run sequentially and either failure aborts
    /// the comparison. The scratch directories are gone by the time this
    /// returns, whatever the outcome.
    #[instrument(skip(self), fields(tool = %self.tool))]
    pub fn compare(&self, root_a: &ObjectId, root_b: &ObjectId) -> Result<()> {
        let temp_a = self.scratch_dir()?;
        let temp_b = self.scratch_dir()?;

        let walker = TreeWalker::new(self.store);
        let materializer = Materializer::new(self.store);

        for (root, dir) in [(root_a, &temp_a), (root_b, &temp_b)] {
            let blobs = walker.expand(root)?;
            let report = materializer.materialize(&blobs, dir.path())?;
            info!(
                root = %root.short(),
                files = report.files_written,
                warnings = report.warnings.len(),
                "tree staged for comparison"
            );
        }

        let status = Command::new(&self.tool)
            .arg(temp_a.path())
            .arg(temp_b.path())
            .status()
            .map_err(|e| VaultError::external_tool(&self.tool, e.to_string()))?;
        // Non-zero just means the tool saw differences.
        debug!(?status, "diff tool exited");

        temp_a.close()?;
        temp_b.close()?;
        Ok(())
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let dir = match &self.temp_root {
            Some(root) => TempDir::new_in(root)?,
            None => TempDir::new()?,
        };
        Ok(dir)
    }
}
