//! Backup lifecycle orchestration
//!
//! Thin glue over the git binary for creating and growing a home-history
//! repository. Snapshot commits, object storage, and history retention
//! all belong to git itself; this module sequences the commands and
//! enforces the preconditions that make the repository safe to treat as a
//! backup: a recent enough git, `gc.pruneExpire` pinned to `never` so
//! unreferenced snapshots are never expired, and a private umask before
//! anything is written.

use crate::error::{Result, VaultError};
use crate::utils;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, instrument, warn};

/// Oldest git that honours `gc.pruneExpire = never` reliably.
const REQUIRED_GIT_VERSION: [u32; 4] = [1, 7, 0, 3];

/// Umask forced before the repository is touched, so history stays
/// readable only by its owner.
const BACKUP_UMASK: u32 = 0o077;

const GITIGNORE_SEED: &str = "\
# Here are some examples of what you might want to ignore
# in your backup history. Feel free to modify.
#
# The rules are read from top to bottom, so a rule can
# \"cancel\" out a previous one. Be careful.
#
# For more information on the syntax used in this file,
# see \"man gitignore\".
";

/// Init/commit orchestration for one backed-up directory.
#[derive(Debug)]
pub struct Backup {
    directory: PathBuf,
}

impl Backup {
    /// A lifecycle handle for `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Backup {
            directory: directory.into(),
        }
    }

    /// The directory being backed up.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Verify the git binary exists and is new enough.
    pub fn preflight(&self) -> Result<()> {
        let output = Command::new("git")
            .arg("--version")
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    VaultError::DependencyNotFound("git".to_string())
                }
                _ => VaultError::external_tool("git", e.to_string()),
            })?;
        if !output.status.success() {
            return Err(VaultError::external_tool("git", "'git --version' failed"));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let version = text
            .strip_prefix("git version ")
            .map(str::trim)
            .ok_or_else(|| {
                VaultError::external_tool("git", format!("unrecognized version string {text:?}"))
            })?;
        if !version_at_least(version, &REQUIRED_GIT_VERSION) {
            return Err(VaultError::VersionMismatch {
                found: version.to_string(),
                required: REQUIRED_GIT_VERSION.map(|n| n.to_string()).join("."),
            });
        }
        debug!(version, "git preflight ok");
        Ok(())
    }

    /// Whether `directory/.git` looks like an initialized repository.
    pub fn initialized(&self) -> Result<bool> {
        utils::has_objects_and_refs(&self.directory.join(".git"))
    }

    /// Create the backup repository and its first commit.
    #[instrument(skip(self), fields(directory = %self.directory.display()))]
    pub fn init(&self) -> Result<()> {
        if self.initialized()? {
            return Err(VaultError::AlreadyInitialized(self.directory.clone()));
        }
        utils::set_umask(BACKUP_UMASK);

        self.git_passthrough(&["init", "--shared=umask"])?;
        self.write_description()?;
        self.ensure_user_name()?;
        self.seed_gitignore()?;
        self.git_passthrough(&["add", "-f", ".gitignore"])?;
        self.git_passthrough(&["commit", "-q", "-a", "-m", "Initialized by gitvault"])?;
        self.ensure_prune_never()?;

        info!("backup repository initialized");
        Ok(())
    }

    /// Record the current state of the directory as a new snapshot.
    #[instrument(skip(self), fields(directory = %self.directory.display()))]
    pub fn commit(&self) -> Result<()> {
        if !self.initialized()? {
            return Err(VaultError::NotInitialized(self.directory.clone()));
        }
        utils::set_umask(BACKUP_UMASK);
        self.ensure_prune_never()?;

        info!("adding new and modified files");
        self.git_passthrough(&["add", "-v", "--ignore-errors", "."])?;

        self.remove_deleted_files()?;

        let message = format!(
            "Committed on {}",
            Local::now().format("%a, %d %b %Y %H:%M:%S %z")
        );
        self.git_passthrough(&["commit", "-m", &message])?;

        info!("optimizing and compacting repository");
        self.git_passthrough(&["gc", "--auto"])?;
        Ok(())
    }

    /// `gc.pruneExpire` must be `never`; set it when unset, reject any
    /// other value so a stray `git gc` can never expire old snapshots.
    fn ensure_prune_never(&self) -> Result<()> {
        match self.git_capture(&["config", "gc.pruneExpire"]) {
            Ok(value) => {
                let value = value.trim();
                if value != "never" {
                    return Err(VaultError::StoreConfig(format!(
                        "gc.pruneExpire is '{value}', must be 'never'"
                    )));
                }
                Ok(())
            }
            Err(_) => {
                warn!("gc.pruneExpire was not set; setting it to 'never'");
                self.git_passthrough(&["config", "gc.pruneExpire", "never"])
            }
        }
    }

    /// Drop files deleted from the working tree out of the index so the
    /// next snapshot reflects their removal.
    fn remove_deleted_files(&self) -> Result<()> {
        let listing = self.git_capture(&["ls-files", "--deleted", "-z"])?;
        let deleted: Vec<&str> = listing.split('\0').filter(|p| !p.is_empty()).collect();
        if deleted.is_empty() {
            return Ok(());
        }

        info!(count = deleted.len(), "removing deleted files from the index");
        let mut args = vec!["rm", "--cached", "--ignore-unmatch", "--quiet", "--"];
        args.extend(&deleted);
        self.git_passthrough(&args)
    }

    fn write_description(&self) -> Result<()> {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown-host".to_string());
        let description = format!(
            "Backup of {} on {}",
            self.directory.display(),
            host
        );
        fs::write(self.directory.join(".git").join("description"), description)?;
        Ok(())
    }

    /// Make sure commits have an author even on machines with no global
    /// git configuration.
    fn ensure_user_name(&self) -> Result<()> {
        if self.git_capture(&["config", "user.name"]).is_ok() {
            return Ok(());
        }
        let user = std::env::var("USER").unwrap_or_else(|_| "backup".to_string());
        self.git_passthrough(&["config", "user.name", &user])
    }

    fn seed_gitignore(&self) -> Result<()> {
        let path = self.directory.join(".gitignore");
        if !path.exists() {
            fs::write(&path, GITIGNORE_SEED)?;
        }
        Ok(())
    }

    /// Run git letting its output flow to the terminal.
    fn git_passthrough(&self, args: &[&str]) -> Result<()> {
        debug!(?args, "git");
        let status = Command::new("git")
            .arg("-C")
            .arg(&self.directory)
            .args(args)
            .status()
            .map_err(|e| VaultError::external_tool("git", e.to_string()))?;
        if !status.success() {
            return Err(VaultError::external_tool(
                "git",
                format!("git {} exited with {status}", args.first().unwrap_or(&"?")),
            ));
        }
        Ok(())
    }

    /// Run git capturing stdout; a non-zero exit is an error.
    fn git_capture(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.directory)
            .args(args)
            .stderr(Stdio::null())
            .output()
            .map_err(|e| VaultError::external_tool("git", e.to_string()))?;
        if !output.status.success() {
            return Err(VaultError::external_tool(
                "git",
                format!("git {} exited with {}", args.first().unwrap_or(&"?"), output.status),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Compare a dotted version string against a required minimum,
/// component-wise; missing components count as zero.
fn version_at_least(version: &str, required: &[u32]) -> bool {
    let mut parts = version
        .split('.')
        .map(|p| p.trim().parse::<u32>().unwrap_or(0));
    for &want in required {
        let got = parts.next().unwrap_or(0);
        if got > want {
            return true;
        }
        if got < want {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_version_comparison() {
        assert!(version_at_least("2.39.5", &REQUIRED_GIT_VERSION));
        assert!(version_at_least("1.7.0.3", &REQUIRED_GIT_VERSION));
        assert!(version_at_least("1.7.1", &REQUIRED_GIT_VERSION));
        assert!(!version_at_least("1.7.0.2", &REQUIRED_GIT_VERSION));
        assert!(!version_at_least("1.6.9", &REQUIRED_GIT_VERSION));
        // Trailing garbage components compare as zero rather than panicking.
        assert!(version_at_least("2.39.5.windows.1", &REQUIRED_GIT_VERSION));
    }

    #[test]
    fn test_initialized_probe() {
        let dir = TempDir::new().unwrap();
        let backup = Backup::new(dir.path());
        assert!(!backup.initialized().unwrap());

        let git_dir = dir.path().join(".git");
        fs::create_dir_all(git_dir.join("objects")).unwrap();
        assert!(!backup.initialized().unwrap());

        fs::create_dir_all(git_dir.join("refs")).unwrap();
        assert!(backup.initialized().unwrap());
    }

    #[test]
    fn test_commit_outside_repository_is_typed_error() {
        let dir = TempDir::new().unwrap();
        let backup = Backup::new(dir.path());
        assert!(matches!(
            backup.commit(),
            Err(VaultError::NotInitialized(_))
        ));
    }
}
