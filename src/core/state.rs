//! Repository identity and observable status state.
//!
//! # Public API
//! - [`BackendKind`], [`RepoAccessObject`]: which storage backend holds a repository and where
//! - [`Author`]: commit identity
//! - [`ModifiedFile`]: one entry of the visible modified-file set
//! - [`CommitInfo`]: one entry of the history view
//! - [`StatusSnapshot`]: everything the status reconciler publishes, with derived flags

use crate::core::file_status::FileStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Storage backend a repository lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Transient in-memory storage; cannot host git plumbing.
    Memory,
    /// Durable app-owned storage driven by in-process plumbing.
    Persistent,
    /// The native filesystem, driven by the `git` executable.
    Native,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Memory, BackendKind::Persistent, BackendKind::Native];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Persistent => "persistent",
            BackendKind::Native => "native",
        }
    }

    /// Whether git work is delegated to the native `git` executable.
    pub fn uses_native_plumbing(&self) -> bool {
        matches!(self, BackendKind::Native)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a repository: backend plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoAccessObject {
    pub backend: BackendKind,
    pub repo_name: String,
}

impl RepoAccessObject {
    pub fn new(backend: BackendKind, repo_name: impl Into<String>) -> Self {
        Self {
            backend,
            repo_name: repo_name.into(),
        }
    }

    /// Root directory of the repository inside its backend's filesystem.
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(format!("/{}/{}", self.backend.as_str(), self.repo_name))
    }

    /// Absolute filesystem path of a repo-relative path.
    pub fn path_of(&self, relative: &str) -> PathBuf {
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() || relative == "." {
            self.root_path()
        } else {
            self.root_path().join(relative)
        }
    }
}

impl fmt::Display for RepoAccessObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.backend, self.repo_name)
    }
}

/// Name and email recorded on commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl Default for Author {
    fn default() -> Self {
        Self::new("Course Author", "author@localhost")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedFile {
    pub name: String,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_merge_conflict: bool,
}

impl ModifiedFile {
    pub fn new(name: impl Into<String>, status: FileStatus) -> Self {
        Self {
            name: name.into(),
            status,
            has_merge_conflict: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub oid: String,
    pub message: String,
    pub author: Author,
    pub timestamp: DateTime<Utc>,
    pub parents: Vec<String>,
}

impl CommitInfo {
    pub fn short_id(&self) -> &str {
        &self.oid[..self.oid.len().min(7)]
    }

    /// First line of the commit message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Observable status of one repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub modified_files: Vec<ModifiedFile>,
    pub stash_files: Vec<ModifiedFile>,
    pub stashes: Vec<String>,
    pub commits: Vec<CommitInfo>,
    pub is_in_merge: bool,
    pub getting_status: bool,
}

impl StatusSnapshot {
    /// Any change that is fully staged and ready to commit.
    pub fn can_commit(&self) -> bool {
        self.modified_files.iter().any(|file| file.status.is_staged())
    }

    /// Any change not yet fully staged.
    pub fn can_stage(&self) -> bool {
        self.modified_files.iter().any(|file| !file.status.is_staged())
    }

    pub fn num_staged(&self) -> usize {
        self.modified_files
            .iter()
            .filter(|file| file.status.is_staged())
            .count()
    }

    /// A tracked change exists and no stash is held yet.
    pub fn can_stash(&self) -> bool {
        self.modified_files
            .iter()
            .any(|file| file.status != FileStatus::Untracked)
            && self.stashes.is_empty()
    }

    pub fn can_pop(&self) -> bool {
        !self.stashes.is_empty()
    }

    pub fn has_merge_conflicts(&self) -> bool {
        self.modified_files.iter().any(|file| file.has_merge_conflict)
    }

    pub fn file(&self, name: &str) -> Option<&ModifiedFile> {
        self.modified_files.iter().find(|file| file.name == name)
    }

    /// Paths of the visible modified-file set, in display order.
    pub fn paths(&self) -> Vec<String> {
        self.modified_files.iter().map(|file| file.name.clone()).collect()
    }
}
