//! Error types for the gitvault library
//!
//! The engine surfaces structured error values and leaves mapping to process
//! exit codes to the calling CLI. Every fatal condition names the object id,
//! ref name, or filesystem path implicated rather than a generic message.

use crate::types::ObjectId;
use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the gitvault library
pub type Result<T> = std::result::Result<T, VaultError>;

/// Main error type for all gitvault operations
#[derive(Debug, Error)]
pub enum VaultError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A store query or fetch for an object failed
    #[error("object {id} is unreadable: {reason}")]
    ObjectUnreadable {
        /// Id of the tree or blob that could not be read
        id: ObjectId,
        /// What the store reported
        reason: String,
    },

    /// A ref name could not be resolved to a commit
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// A filesystem write, permission, or symlink operation failed
    #[error("could not materialize {path:?}: {source}")]
    Materialization {
        /// The destination path that failed
        path: PathBuf,
        /// Underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// Destination path already exists with an incompatible type
    #[error("path conflict: {path:?} exists and is not a symlink")]
    PathConflict {
        /// The occupied destination path
        path: PathBuf,
    },

    /// An external process could not even be spawned
    ///
    /// Distinct from a diff tool exiting non-zero, which merely reports
    /// that differences were found.
    #[error("external tool '{tool}' failed: {reason}")]
    ExternalTool {
        /// Program that was being invoked
        tool: String,
        /// Spawn or wait failure description
        reason: String,
    },

    /// A path pattern failed to compile
    #[error("invalid path pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A string was not a well-formed object id
    #[error("invalid object id: '{0}'")]
    InvalidObjectId(String),

    /// The git binary is missing from PATH
    #[error("dependency not found: {0}")]
    DependencyNotFound(String),

    /// The git binary is too old for safe backups
    #[error("git version {found} is too old; {required} or newer is required")]
    VersionMismatch {
        /// Version reported by the binary
        found: String,
        /// Minimum supported version
        required: String,
    },

    /// A store configuration value would endanger history retention
    #[error("store configuration error: {0}")]
    StoreConfig(String),

    /// No backup repository exists where one was expected
    #[error("no backup repository initialized in {0:?}")]
    NotInitialized(PathBuf),

    /// A backup repository already exists where `init` was asked to run
    #[error("backup repository already initialized in {0:?}")]
    AlreadyInitialized(PathBuf),

    /// Mutually exclusive or malformed options
    #[error("{0}")]
    Usage(String),
}

impl VaultError {
    /// Create an `ObjectUnreadable` error for `id`.
    pub fn unreadable(id: ObjectId, reason: impl Into<String>) -> Self {
        VaultError::ObjectUnreadable {
            id,
            reason: reason.into(),
        }
    }

    /// Create an `ExternalTool` error for `tool`.
    pub fn external_tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        VaultError::ExternalTool {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Create a `Usage` error with a custom message.
    pub fn usage(msg: impl Into<String>) -> Self {
        VaultError::Usage(msg.into())
    }

    /// The exit-code class the CLI reports for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            VaultError::Usage(_) => ExitCode::UsageError,
            VaultError::DependencyNotFound(_) | VaultError::ExternalTool { .. } => {
                ExitCode::DependencyNotFound
            }
            VaultError::VersionMismatch { .. } => ExitCode::VersionError,
            VaultError::StoreConfig(_) => ExitCode::StoreConfigError,
            VaultError::Io(_) => ExitCode::StrangeEnvironment,
            VaultError::AlreadyInitialized(_) => ExitCode::AlreadyInitialized,
            VaultError::RefNotFound(_) => ExitCode::NoSuchRef,
            VaultError::NotInitialized(_) => ExitCode::RepositoryNotInitialized,
            VaultError::ObjectUnreadable { .. } | VaultError::InvalidObjectId(_) => {
                ExitCode::UnreadableObject
            }
            VaultError::Materialization { .. } | VaultError::PathConflict { .. } => {
                ExitCode::MaterializationFailed
            }
            VaultError::InvalidPattern(_) => ExitCode::BadPattern,
        }
    }
}

/// Process exit codes for the command-line surface.
///
/// Each value names one class of precondition failure. The engine never
/// exits by itself; the CLI maps a [`VaultError`] to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Malformed or mutually exclusive command-line options
    UsageError = 1,
    /// A required external program is not on PATH or would not spawn
    DependencyNotFound = 2,
    /// The external git binary is too old
    VersionError = 3,
    /// A store configuration value is unsafe for backups
    StoreConfigError = 4,
    /// An unexpected filesystem or environment failure
    StrangeEnvironment = 5,
    /// `init` found an existing repository
    AlreadyInitialized = 8,
    /// A named ref does not exist
    NoSuchRef = 9,
    /// A lifecycle command ran outside an initialized repository
    RepositoryNotInitialized = 10,
    /// A tree or blob could not be read from the store
    UnreadableObject = 13,
    /// Writing the materialized tree to disk failed
    MaterializationFailed = 14,
    /// The path pattern did not compile
    BadPattern = 15,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}
