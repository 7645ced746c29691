//! Scripted in-memory plumbing
//!
//! Reports whatever status rows a test loads into it, counts status queries
//! and records index updates, so session behavior can be checked without a
//! real repository.

#![allow(dead_code)]

use async_trait::async_trait;
use course_git_sync::core::paths::in_scope;
use course_git_sync::core::{
    Author, CloneOptions, CommitInfo, CommitRequest, EngineConfig, MemoryFs, MergeOutcome, ObjectCache,
    Plumbing, RepoAccessObject, RepoSession, Remote, RemoteOptions, StashOp, StatusRow, SyncError, TreeEntry,
};
use course_git_sync::{BackendKind, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct ScriptedPlumbing {
    pub rows: Mutex<Vec<StatusRow>>,
    pub status_calls: AtomicUsize,
    /// How long each status query takes.
    pub delay: Mutex<Duration>,
    /// Status queries fail with `Locked` while set.
    pub locked: AtomicBool,
    /// Merges fail with a conflict while set.
    pub conflicting: AtomicBool,
    pub added: Mutex<Vec<String>>,
    pub removed: Mutex<Vec<String>>,
    pub commits: Mutex<Vec<CommitRequest>>,
    /// How long each fetch takes.
    pub fetch_delay: Mutex<Duration>,
    pub log_calls: AtomicUsize,
    pub stash_calls: AtomicUsize,
    /// Refs `resolve_ref` knows about; anything else is not found.
    pub refs: Mutex<HashMap<String, String>>,
}

impl ScriptedPlumbing {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_rows(&self, rows: Vec<StatusRow>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn set_ref(&self, name: &str, oid: &str) {
        self.refs.lock().unwrap().insert(name.to_string(), oid.to_string());
    }

    pub fn log_calls(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }

    pub fn stash_calls(&self) -> usize {
        self.stash_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn added(&self) -> Vec<String> {
        self.added.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Plumbing for ScriptedPlumbing {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports_batch_add(&self) -> bool {
        true
    }

    async fn init(&self, _default_branch: &str) -> Result<()> {
        Ok(())
    }

    async fn clone_repo(&self, _options: &CloneOptions) -> Result<()> {
        Ok(())
    }

    async fn status_matrix(&self, scope: Option<&[String]>) -> Result<Vec<StatusRow>> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.locked.load(Ordering::SeqCst) {
            return Err(SyncError::Locked {
                message: "index.lock exists".to_string(),
            });
        }

        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| in_scope(&row.path, scope))
            .cloned()
            .collect())
    }

    async fn add(&self, paths: &[String]) -> Result<()> {
        self.added.lock().unwrap().extend(paths.iter().cloned());
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.removed.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn reset_index(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn commit(&self, request: &CommitRequest) -> Result<String> {
        let mut commits = self.commits.lock().unwrap();
        commits.push(request.clone());
        Ok(format!("{:040x}", commits.len()))
    }

    async fn log(&self, _rev: Option<&str>, _depth: Option<usize>) -> Result<Vec<CommitInfo>> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn list_branches(&self) -> Result<Vec<String>> {
        Ok(vec!["main".to_string()])
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        Ok(Some("main".to_string()))
    }

    async fn checkout(&self, _rev: &str, _force: bool) -> Result<()> {
        Ok(())
    }

    async fn write_ref(&self, _name: &str, _target: &str, _force: bool) -> Result<()> {
        Ok(())
    }

    async fn resolve_ref(&self, name: &str) -> Result<String> {
        self.refs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::not_found(name))
    }

    async fn read_tree(&self, _rev: &str) -> Result<Arc<Vec<TreeEntry>>> {
        Ok(Arc::new(Vec::new()))
    }

    async fn read_blob(&self, rev: &str, path: &str) -> Result<Arc<Vec<u8>>> {
        Err(SyncError::not_found(format!("{rev}:{path}")))
    }

    async fn list_remotes(&self) -> Result<Vec<Remote>> {
        Ok(Vec::new())
    }

    async fn add_remote(&self, _name: &str, _url: &str) -> Result<()> {
        Ok(())
    }

    async fn push(&self, _remote: &RemoteOptions, _force: bool) -> Result<()> {
        Ok(())
    }

    async fn fetch(&self, _remote: &RemoteOptions) -> Result<()> {
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn merge(
        &self,
        _ours: &str,
        theirs: &str,
        _abort_on_conflict: bool,
        _author: &Author,
    ) -> Result<MergeOutcome> {
        if self.conflicting.load(Ordering::SeqCst) {
            return Err(SyncError::merge_conflict(format!("Merge conflict merging {theirs}")));
        }
        Ok(MergeOutcome::UpToDate)
    }

    async fn stash(&self, _op: StashOp) -> Result<Vec<String>> {
        self.stash_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn set_config(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn get_config(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A session on an in-memory filesystem driven by `plumbing`.
///
/// Status caches go under `cache_root`.
pub fn scripted_session(plumbing: Arc<ScriptedPlumbing>, cache_root: &std::path::Path) -> (RepoSession, Arc<MemoryFs>) {
    super::init_test_logging();
    let fs = Arc::new(MemoryFs::new());
    let mut config = EngineConfig::rooted_at(cache_root);
    config.author = Author::new("Test User", "test@example.com");

    let session = RepoSession::with_parts(
        RepoAccessObject::new(BackendKind::Memory, "scripted"),
        fs.clone(),
        plumbing,
        Arc::new(ObjectCache::new()),
        config,
    );
    (session, fs)
}
