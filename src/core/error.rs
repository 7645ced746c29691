//! Domain-specific error types and error handling utilities.
//!
//! This module defines [`SyncError`] which covers every failure mode of the
//! reconciliation engine. It uses `thiserror` for ergonomic error definitions
//! and includes constructors for the common failure scenarios.
//!
//! # Public API
//! - [`SyncError`]: Main error enum covering all failure modes
//! - [`Result<T>`]: Type alias for `std::result::Result<T, SyncError>`
//!
//! # Error Categories
//! - **Transient**: the object store is locked by another writer
//! - **Remote**: authentication, authorization, missing remote, rejected push, network
//! - **Merge**: conflicts during pull or an attempted merge
//! - **Staging**: aggregate batch failures
//! - **Storage**: filesystem, YAML and JSON errors, status cache errors
//!
//! libgit2 errors are classified into the categories above by the
//! `From<git2::Error>` conversion, so `?` on a `git2` call already yields the
//! right variant.

use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use thiserror::Error;

/// Message used when the remote rejects the credentials (HTTP 401 and 403).
pub const AUTH_FAILED_MESSAGE: &str = "The credentials provided are invalid; authentication has failed.";

/// Fallback message for a missing remote repository.
pub const REMOTE_NOT_FOUND_MESSAGE: &str =
    "The repository could not be found or you do not have permission to view it";

/// Domain-specific error types for the reconciliation engine
#[derive(Error, Debug)]
pub enum SyncError {
    // Transient
    #[error("The repository is locked by another operation: {message}")]
    Locked { message: String },

    // Remote errors
    #[error("{}", AUTH_FAILED_MESSAGE)]
    Authentication,

    #[error("{}", AUTH_FAILED_MESSAGE)]
    Authorization,

    #[error("{}", .message.as_deref().unwrap_or(REMOTE_NOT_FOUND_MESSAGE))]
    RemoteNotFound { message: Option<String> },

    #[error("Push failed because it was not a simple fast forward. Additional commits exist on the remote; please pull and try again.")]
    NotFastForward,

    #[error("Push failed because it could not reach the remote URL. Please check that your network connection is stable and that the remote URL is correct.")]
    Network { message: String },

    #[error("No branch was found to push. Please ensure your course has a branch to be pushed to the remote.")]
    NoBranchToPush,

    // Merge errors
    #[error("{message}")]
    MergeConflict { message: String },

    #[error("The repository could not be pulled due to merge conflicts. Retry the pull with merging enabled to resolve them.")]
    MergeConflictNotAttempted,

    #[error("A pull or merge is already running for this repository")]
    PullInProgress,

    // Staging errors
    #[error("Could not stage files: {message}")]
    StageFailed { message: String },

    #[error("Could not unstage file '{path}': {message}")]
    UnstageFailed { path: String, message: String },

    // Repository lifecycle
    #[error("A repository named '{name}' already exists")]
    RepoNameInUse { name: String },

    #[error("A course named '{name}' already exists")]
    CourseNameInUse { name: String },

    #[error("Course descriptor not found at '{path}'")]
    CourseDescriptorMissing { path: String },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("The '{backend}' backend cannot run git operations")]
    PlumbingUnavailable { backend: String },

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Git repository error: {0}")]
    Git(git2::Error),

    #[error("Invalid UTF-8 path in repository")]
    InvalidUtf8Path,

    // Storage errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // Cache errors
    #[error("Could not find cache directory")]
    CacheDirectoryNotFound,

    #[error("Failed to create cache directory '{path}': {source}")]
    CacheDirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize cache data: {source}")]
    CacheSerializationFailed { source: serde_json::Error },

    #[error("Failed to write cache file '{path}': {source}")]
    CacheWriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cache file does not exist at '{path}'")]
    CacheFileNotFound { path: PathBuf },

    #[error("Failed to read cache file '{path}': {source}")]
    CacheReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse cache file '{path}': {source}")]
    CacheParseFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Internal lock poisoned: {what}")]
    LockPoisoned { what: String },

    #[error("Background git task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Convenience type alias for Results using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

impl From<git2::Error> for SyncError {
    fn from(err: git2::Error) -> Self {
        classify_git2_error(err)
    }
}

/// Map a libgit2 error onto the engine's taxonomy.
pub fn classify_git2_error(err: git2::Error) -> SyncError {
    use git2::{ErrorClass, ErrorCode};

    let message = err.message().to_string();
    let lowered = message.to_lowercase();

    match err.code() {
        ErrorCode::Auth => return SyncError::Authentication,
        ErrorCode::NotFastForward => return SyncError::NotFastForward,
        ErrorCode::Locked => return SyncError::Locked { message },
        ErrorCode::Conflict | ErrorCode::MergeConflict | ErrorCode::Unmerged => {
            return SyncError::MergeConflict { message }
        }
        _ => {}
    }

    match err.class() {
        ErrorClass::Http | ErrorClass::Net | ErrorClass::Ssl | ErrorClass::Ssh => {
            let status = http_status(&lowered);
            if status == Some(401) || lowered.contains("authentication") {
                SyncError::Authentication
            } else if status == Some(403) {
                SyncError::Authorization
            } else if status == Some(404) || lowered.contains("not found") {
                SyncError::RemoteNotFound { message: None }
            } else {
                SyncError::Network { message }
            }
        }
        _ if err.code() == ErrorCode::NotFound => SyncError::NotFound { what: message },
        _ if lowered.contains("does not match any") => SyncError::NotFound { what: message },
        _ if lowered.contains("non-fastforwardable") || lowered.contains("not fast-forward") => {
            SyncError::NotFastForward
        }
        _ => SyncError::Git(err),
    }
}

static HTTP_STATUS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?:returned error:|\bhttp(?:/[0-9.]+)?|\bstatus code:?)\s*([45][0-9]{2})\b").ok()
});

/// HTTP status reported by a transport failure, if any.
///
/// Only codes in an HTTP context count; a bare `404` elsewhere (a file
/// name in a merge report, say) is ignored.
fn http_status(lowered: &str) -> Option<u16> {
    HTTP_STATUS
        .as_ref()?
        .captures(lowered)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Whether git's output reports a content conflict from a merge or stash apply.
pub fn reports_conflict(output: &str) -> bool {
    output.contains("CONFLICT (")
        || output.contains("Automatic merge failed")
        || output.contains("fix conflicts and then commit")
}

/// Map the output of a failed `git` invocation onto the engine's taxonomy.
///
/// Conflict reports are recognized first: they list paths, and paths may
/// contain anything.
pub fn classify_git_stderr(command: &str, stderr: &str) -> SyncError {
    let lowered = stderr.to_lowercase();
    let status = http_status(&lowered);

    if reports_conflict(stderr) {
        SyncError::MergeConflict {
            message: stderr.trim().to_string(),
        }
    } else if lowered.contains("index.lock") || (lowered.contains("unable to create") && lowered.contains(".lock")) {
        SyncError::Locked {
            message: stderr.trim().to_string(),
        }
    } else if status == Some(401)
        || lowered.contains("authentication failed")
        || lowered.contains("could not read username")
    {
        SyncError::Authentication
    } else if status == Some(403) {
        SyncError::Authorization
    } else if status == Some(404)
        || lowered.contains("repository not found")
        || (lowered.contains("repository '") && lowered.contains("not found"))
        || lowered.contains("does not appear to be a git repository")
    {
        SyncError::RemoteNotFound {
            message: remote_message(stderr),
        }
    } else if lowered.contains("non-fast-forward")
        || lowered.contains("fetch first")
        || lowered.contains("[rejected]")
    {
        SyncError::NotFastForward
    } else if lowered.contains("could not resolve host")
        || lowered.contains("failed to connect")
        || lowered.contains("unable to access")
        || lowered.contains("connection refused")
    {
        SyncError::Network {
            message: stderr.trim().to_string(),
        }
    } else if lowered.contains("does not match any") {
        SyncError::NotFound {
            what: stderr.trim().to_string(),
        }
    } else {
        SyncError::CommandFailed {
            command: command.to_string(),
            stderr: stderr.trim().to_string(),
        }
    }
}

/// The remote's own explanation, taken from `remote:` lines when present.
fn remote_message(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .lines()
        .filter_map(|line| line.strip_prefix("remote:"))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

impl SyncError {
    /// Create a merge conflict error with a specific message
    pub fn merge_conflict(message: impl Into<String>) -> Self {
        Self::MergeConflict {
            message: message.into(),
        }
    }

    /// Create a stage failed error
    pub fn stage_failed(message: impl Into<String>) -> Self {
        Self::StageFailed {
            message: message.into(),
        }
    }

    /// Create an unstage failed error
    pub fn unstage_failed(path: impl Into<String>, source: &SyncError) -> Self {
        Self::UnstageFailed {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a plumbing unavailable error for a backend
    pub fn plumbing_unavailable(backend: impl Into<String>) -> Self {
        Self::PlumbingUnavailable {
            backend: backend.into(),
        }
    }

    /// Create a lock poisoned error
    pub fn lock_poisoned(what: impl Into<String>) -> Self {
        Self::LockPoisoned { what: what.into() }
    }

    /// Create a cache directory creation failed error
    pub fn cache_directory_creation_failed(
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::CacheDirectoryCreationFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a cache serialization failed error
    pub fn cache_serialization_failed(source: serde_json::Error) -> Self {
        Self::CacheSerializationFailed { source }
    }

    /// Create a cache write failed error
    pub fn cache_write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CacheWriteFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a cache file not found error
    pub fn cache_file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::CacheFileNotFound { path: path.into() }
    }

    /// Create a cache read failed error
    pub fn cache_read_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CacheReadFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a cache parse failed error
    pub fn cache_parse_failed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::CacheParseFailed {
            path: path.into(),
            source,
        }
    }

    /// True when the error means "the thing asked for does not exist".
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// True when the error is a transient lock on the object store.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    /// True for conflicts raised while pulling or merging.
    pub fn is_merge_conflict(&self) -> bool {
        matches!(self, Self::MergeConflict { .. })
    }
}
