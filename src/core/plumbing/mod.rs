//! Git plumbing facade.
//!
//! The rest of the engine talks to git exclusively through the [`Plumbing`]
//! trait. Two implementations exist and are chosen once, when a session is
//! opened, from the repository's [`BackendKind`]:
//!
//! - [`Git2Plumbing`]: in-process, backed by `git2`/libgit2
//! - [`CliPlumbing`]: delegated to the native `git` executable
//!
//! Both share the session's [`ObjectCache`] of decoded trees and blobs.
//!
//! # Public API
//! - [`Plumbing`]: the primitive operations
//! - [`open_plumbing`]: backend selection
//! - Request/response types: [`CommitRequest`], [`CloneOptions`], [`RemoteOptions`],
//!   [`Credentials`], [`StashOp`], [`MergeOutcome`], [`Remote`], [`TreeEntry`], [`WalkRow`]

mod cache;
mod cli;
mod in_process;

pub use cache::ObjectCache;
pub use cli::CliPlumbing;
pub use in_process::Git2Plumbing;

use crate::core::error::Result;
use crate::core::file_status::StatusRow;
use crate::core::state::{Author, BackendKind, CommitInfo};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A blob reachable from a tree, with its full repo-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub oid: String,
    pub mode: u32,
}

/// One path of a multi-tree walk; `oids[i]` is the blob id in the i-th tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkRow {
    pub path: String,
    pub oids: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Remote and branch targeted by fetch, pull and push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOptions {
    pub remote: String,
    pub branch: String,
    pub credentials: Option<Credentials>,
}

impl RemoteOptions {
    pub fn new(remote: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            branch: branch.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Remote-tracking ref the branch is fetched into.
    pub fn tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", self.remote, self.branch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOptions {
    pub url: String,
    pub branch: Option<String>,
    pub depth: Option<u32>,
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub message: String,
    pub author: Author,
    /// Explicit parents; `None` commits on top of HEAD.
    pub parents: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StashOp {
    Push { message: String },
    Pop,
    List,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    UpToDate,
    FastForward { oid: String },
    Merged { oid: String },
}

/// Primitive git operations required by the engine.
#[async_trait]
pub trait Plumbing: Send + Sync {
    /// Short name of the implementation, for logging.
    fn name(&self) -> &'static str;

    /// Whether `add` with many paths is a single atomic index update.
    fn supports_batch_add(&self) -> bool;

    async fn init(&self, default_branch: &str) -> Result<()>;

    async fn clone_repo(&self, options: &CloneOptions) -> Result<()>;

    /// Status rows for every path under `scope` (the whole repository when `None`).
    async fn status_matrix(&self, scope: Option<&[String]>) -> Result<Vec<StatusRow>>;

    async fn add(&self, paths: &[String]) -> Result<()>;

    /// Remove a path from the index.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Restore the index entry of a path to its HEAD version.
    async fn reset_index(&self, path: &str) -> Result<()>;

    /// Commit the index, returning the new commit id.
    async fn commit(&self, request: &CommitRequest) -> Result<String>;

    /// History reachable from `rev` (HEAD when `None`), newest first.
    async fn log(&self, rev: Option<&str>, depth: Option<usize>) -> Result<Vec<CommitInfo>>;

    async fn list_branches(&self) -> Result<Vec<String>>;

    async fn current_branch(&self) -> Result<Option<String>>;

    async fn checkout(&self, rev: &str, force: bool) -> Result<()>;

    async fn write_ref(&self, name: &str, target: &str, force: bool) -> Result<()>;

    /// Commit id a ref or revision points at.
    async fn resolve_ref(&self, name: &str) -> Result<String>;

    /// Every blob reachable from the tree of `rev`.
    async fn read_tree(&self, rev: &str) -> Result<Arc<Vec<TreeEntry>>>;

    async fn read_blob(&self, rev: &str, path: &str) -> Result<Arc<Vec<u8>>>;

    async fn list_remotes(&self) -> Result<Vec<Remote>>;

    async fn add_remote(&self, name: &str, url: &str) -> Result<()>;

    async fn push(&self, remote: &RemoteOptions, force: bool) -> Result<()>;

    async fn fetch(&self, remote: &RemoteOptions) -> Result<()>;

    /// Merge `theirs` into the local branch `ours`.
    ///
    /// With `abort_on_conflict` a conflicting merge leaves the working tree
    /// untouched; otherwise conflict markers are written before the
    /// `MergeConflict` error is returned.
    async fn merge(
        &self,
        ours: &str,
        theirs: &str,
        abort_on_conflict: bool,
        author: &Author,
    ) -> Result<MergeOutcome>;

    /// Run a stash operation and return the stash list afterwards.
    async fn stash(&self, op: StashOp) -> Result<Vec<String>>;

    async fn set_config(&self, key: &str, value: &str) -> Result<()>;

    async fn get_config(&self, key: &str) -> Result<Option<String>>;

    /// Fetch then merge, refusing to leave conflicts behind.
    async fn pull(&self, remote: &RemoteOptions, author: &Author) -> Result<MergeOutcome> {
        self.fetch(remote).await?;
        self.merge(&remote.branch, &remote.tracking_ref(), true, author)
            .await
    }

    /// Walk several trees in lockstep, yielding one row per path in any of them.
    async fn walk(&self, revs: &[&str]) -> Result<Vec<WalkRow>> {
        let mut rows: BTreeMap<String, Vec<Option<String>>> = BTreeMap::new();

        for (column, rev) in revs.iter().enumerate() {
            let entries = self.read_tree(rev).await?;
            for entry in entries.iter() {
                let oids = rows
                    .entry(entry.path.clone())
                    .or_insert_with(|| vec![None; revs.len()]);
                oids[column] = Some(entry.oid.clone());
            }
        }

        Ok(rows
            .into_iter()
            .map(|(path, oids)| WalkRow { path, oids })
            .collect())
    }
}

/// Construct the plumbing for a backend. Called once per session.
pub fn open_plumbing(
    backend: BackendKind,
    workdir: PathBuf,
    cache: Arc<ObjectCache>,
    fallback_author: Author,
) -> Arc<dyn Plumbing> {
    if backend.uses_native_plumbing() {
        log::debug!("Using native git for {}", workdir.display());
        Arc::new(CliPlumbing::new(workdir, cache, fallback_author))
    } else {
        log::debug!("Using in-process git for {}", workdir.display());
        Arc::new(Git2Plumbing::new(workdir, cache, fallback_author))
    }
}
