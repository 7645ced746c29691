//! Repository lifecycle: backend wiring, listing, init, clone, open, delete.

use crate::core::config::EngineConfig;
use crate::core::error::{Result, SyncError};
use crate::core::paths::slugify;
use crate::core::plumbing::{open_plumbing, CloneOptions, Credentials, ObjectCache};
use crate::core::session::RepoSession;
use crate::core::state::{BackendKind, RepoAccessObject};
use crate::core::vfs::{EntryKind, Filesystem, LocalFs, MemoryFs};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Clone parameters for [`Engine::clone_repo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
    pub backend: BackendKind,
    /// Display name; the directory name is its slug.
    pub name: String,
    pub url: String,
    pub branch: Option<String>,
    pub credentials: Option<Credentials>,
}

pub struct Engine {
    config: EngineConfig,
    backends: HashMap<BackendKind, Arc<dyn Filesystem>>,
    /// Directory behind the memory backend, removed with the engine.
    scratch: Option<TempDir>,
}

/// Filesystem for the memory backend: a throwaway directory so git can work
/// on it, or a pure in-memory tree when none can be created.
fn memory_backend() -> (Arc<dyn Filesystem>, Option<TempDir>) {
    match tempfile::Builder::new().prefix("course-git-sync-").tempdir() {
        Ok(dir) => {
            log::debug!("Memory backend lives in {}", dir.path().display());
            (Arc::new(LocalFs::new(dir.path())), Some(dir))
        }
        Err(e) => {
            log::warn!("No scratch directory for the memory backend, repositories there cannot be opened: {e}");
            (Arc::new(MemoryFs::new()), None)
        }
    }
}

impl Engine {
    /// Wire the three backends from the configuration: memory in a scratch
    /// directory, durable storage under `storage_root` and native files
    /// under `native_root`.
    pub fn new(config: EngineConfig) -> Self {
        let (memory, scratch) = memory_backend();
        let mut backends: HashMap<BackendKind, Arc<dyn Filesystem>> = HashMap::new();
        backends.insert(BackendKind::Memory, memory);
        backends.insert(
            BackendKind::Persistent,
            Arc::new(LocalFs::new(config.storage_root.clone())),
        );
        backends.insert(
            BackendKind::Native,
            Arc::new(LocalFs::new(config.native_root.clone())),
        );

        Self {
            config,
            backends,
            scratch,
        }
    }

    /// Replace the filesystem serving one backend.
    pub fn with_filesystem(mut self, backend: BackendKind, fs: Arc<dyn Filesystem>) -> Self {
        self.backends.insert(backend, fs);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// On-disk directory behind the memory backend, if it has one.
    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }

    pub fn filesystem(&self, backend: BackendKind) -> Result<Arc<dyn Filesystem>> {
        self.backends
            .get(&backend)
            .cloned()
            .ok_or_else(|| SyncError::plumbing_unavailable(backend.as_str()))
    }

    /// Names of the repositories stored on a backend.
    pub async fn list_repos(&self, backend: BackendKind) -> Result<Vec<String>> {
        let fs = self.filesystem(backend)?;
        let root = format!("/{}", backend.as_str());
        let root = Path::new(&root);

        if !fs.exists(root).await? {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = fs
            .readdir(root)
            .await?
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::Directory)
            .map(|entry| entry.name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Create an empty repository on `default_branch` and open it.
    pub async fn init_repo(&self, repo: &RepoAccessObject, default_branch: &str) -> Result<RepoSession> {
        let fs = self.filesystem(repo.backend)?;
        fs.mkdir(&repo.root_path(), true).await?;

        let session = self.open(repo)?;
        session.plumbing.init(default_branch).await?;

        log::info!("Initialized {repo}");
        Ok(session)
    }

    /// Clone a remote repository into a directory named after the slug of
    /// `request.name`, refusing names that are already taken.
    ///
    /// A failed clone leaves no directory behind.
    pub async fn clone_repo(&self, request: &CloneRequest) -> Result<RepoSession> {
        let name = slugify(&request.name, self.config.max_slug_length);
        if name.is_empty() {
            return Err(SyncError::invalid_path(&request.name, "name has no usable characters"));
        }

        let repo = RepoAccessObject::new(request.backend, name.clone());
        let fs = self.filesystem(request.backend)?;
        let root = repo.root_path();

        if fs.exists(&root).await? {
            log::warn!("Refusing to clone into existing repository {repo}");
            return Err(SyncError::RepoNameInUse { name });
        }

        let session = self.open(&repo)?;
        let options = CloneOptions {
            url: request.url.clone(),
            branch: request.branch.clone(),
            depth: self.config.clone_depth,
            credentials: request.credentials.clone(),
        };

        if let Err(err) = session.plumbing.clone_repo(&options).await {
            log::error!("Clone of {} failed: {err}", request.url);
            if fs.exists(&root).await.unwrap_or(false) {
                if let Err(cleanup) = fs.remove_dir_all(&root).await {
                    log::warn!("Failed to remove partial clone {}: {cleanup}", root.display());
                }
            }
            return Err(err);
        }

        log::info!("Cloned {} as {repo}", request.url);
        Ok(session)
    }

    /// Open a session on an existing repository.
    ///
    /// The plumbing is chosen here, once, from the backend kind.
    pub fn open(&self, repo: &RepoAccessObject) -> Result<RepoSession> {
        let fs = self.filesystem(repo.backend)?;
        let workdir = fs
            .real_path(&repo.root_path())
            .ok_or_else(|| SyncError::plumbing_unavailable(repo.backend.as_str()))?;

        let cache = Arc::new(ObjectCache::new());
        let plumbing = open_plumbing(
            repo.backend,
            workdir,
            Arc::clone(&cache),
            self.config.author.clone(),
        );

        Ok(RepoSession::with_parts(
            repo.clone(),
            fs,
            plumbing,
            cache,
            self.config.clone(),
        ))
    }

    /// Delete a repository and everything in it.
    pub async fn delete_repo(&self, session: RepoSession) -> Result<()> {
        session.cache.clear();
        session.vfs.remove_dir_all(&session.root()).await?;
        log::info!("Deleted {}", session.repo);
        Ok(())
    }
}
