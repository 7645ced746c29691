//! Status reconciliation.
//!
//! Turns plumbing status rows into the visible modified-file set, either for
//! the whole repository or for a handful of paths, and publishes the result
//! together with stash state, history and merge state.

use crate::commands::stash::STASH_REF;
use crate::core::error::{Result, SyncError};
use crate::core::file_status::StatusRow;
use crate::core::paths::in_scope;
use crate::core::plumbing::StashOp;
use crate::core::session::{HistoryMarks, RepoSession};
use crate::core::state::{CommitInfo, ModifiedFile, StatusSnapshot};
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

const CACHE_FILE: &str = "modified-paths.json";

static CONFLICT_MARKERS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^<{7}[\s\S]*?={7}[\s\S]*?>{7}").ok());

/// Whether text carries a complete set of merge conflict markers.
pub fn has_conflict_markers(text: &str) -> bool {
    CONFLICT_MARKERS
        .as_ref()
        .is_some_and(|regex| regex.is_match(text))
}

/// Visible modified files for a set of status rows, in display order.
pub fn modified_files_from_rows(rows: &[StatusRow]) -> Vec<ModifiedFile> {
    let mut files: Vec<ModifiedFile> = rows
        .iter()
        .map(|row| ModifiedFile::new(row.path.clone(), row.status()))
        .filter(|file| file.status.is_visible())
        .collect();
    sort_files(&mut files);
    files
}

/// Order files by status priority, then by path.
pub fn sort_files(files: &mut [ModifiedFile]) {
    files.sort_by(|a, b| {
        a.status
            .sort_priority()
            .cmp(&b.status.sort_priority())
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Freshly read stash and history state, each part possibly failed.
struct HistoryRead {
    stashes: Result<Vec<String>>,
    stash_files: Result<Vec<ModifiedFile>>,
    commits: Result<Vec<CommitInfo>>,
}

impl HistoryRead {
    fn is_complete(&self) -> bool {
        self.stashes.is_ok() && self.stash_files.is_ok() && self.commits.is_ok()
    }

    /// Copy the parts that were read; failed parts keep their old values.
    fn apply(self, snapshot: &mut StatusSnapshot) {
        match self.stashes {
            Ok(stashes) => snapshot.stashes = stashes,
            Err(e) => log::warn!("Failed to list stashes: {e}"),
        }
        match self.stash_files {
            Ok(stash_files) => snapshot.stash_files = stash_files,
            Err(e) => log::warn!("Failed to read stash status: {e}"),
        }
        match self.commits {
            Ok(commits) => snapshot.commits = commits,
            Err(e) => log::warn!("Failed to read history: {e}"),
        }
    }
}

impl RepoSession {
    /// Recompute the modified-file set for the whole repository.
    pub async fn full_resolve(&self) -> Result<()> {
        self.resolve(None).await
    }

    /// Recompute the entries for `paths` (files or directories) only.
    ///
    /// Cached entries equal to or beneath a scope path are dropped and
    /// replaced by the fresh rows; everything else is kept as is.
    pub async fn scoped_resolve(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.resolve(Some(paths)).await
    }

    pub async fn resolve_file(&self, path: &str) -> Result<()> {
        self.scoped_resolve(&[path.to_string()]).await
    }

    pub async fn resolve_dir(&self, path: &str) -> Result<()> {
        self.scoped_resolve(&[path.to_string()]).await
    }

    /// First resolve after opening: re-check the paths persisted by the last
    /// session, or everything when none were persisted.
    pub async fn cold_start_resolve(&self) -> Result<()> {
        match self.load_status_cache() {
            Ok(paths) if !paths.is_empty() => {
                log::debug!("Cold start from {} cached paths", paths.len());
                self.scoped_resolve(&paths).await
            }
            Ok(_) => self.full_resolve().await,
            Err(e) => {
                log::debug!("No usable status cache ({e}), resolving everything");
                self.full_resolve().await
            }
        }
    }

    /// The currently published modified-file set.
    pub fn modified_files(&self) -> Vec<ModifiedFile> {
        self.status_tx.borrow().modified_files.clone()
    }

    async fn resolve(&self, scope: Option<&[String]>) -> Result<()> {
        let Some(_token) = self.flight.try_begin() else {
            log::debug!("Status resolve already running for {}, skipping", self.repo);
            return Ok(());
        };

        self.publish(|snapshot| snapshot.getting_status = true);
        let result = self.resolve_in_flight(scope).await;
        self.publish(|snapshot| snapshot.getting_status = false);

        match result {
            Err(e) if e.is_locked() => {
                log::warn!("Repository {} is locked, keeping previous status: {e}", self.repo);
                Ok(())
            }
            other => other,
        }
    }

    async fn resolve_in_flight(&self, scope: Option<&[String]>) -> Result<()> {
        let rows = self.plumbing.status_matrix(scope).await?;
        let mut fresh = modified_files_from_rows(&rows);

        let in_merge = self.vfs.exists(&self.sentinel_path()).await?;
        if in_merge {
            self.mark_conflicts(&mut fresh).await;
        }

        let mut files = match scope {
            None => fresh,
            Some(scope) => {
                let mut files = self.modified_files();
                files.retain(|file| {
                    !in_scope(&file.name, Some(scope))
                        && !fresh.iter().any(|fresh| fresh.name == file.name)
                });
                files.extend(fresh);
                files
            }
        };
        sort_files(&mut files);

        let history = self.refresh_history(scope.is_none()).await;

        let paths: Vec<String> = files.iter().map(|file| file.name.clone()).collect();
        self.publish(|snapshot| {
            snapshot.modified_files = files;
            snapshot.is_in_merge = in_merge;
            if let Some(history) = history {
                history.apply(snapshot);
            }
        });

        log::debug!(
            "Resolved {} ({}): {} modified files",
            self.repo,
            if scope.is_some() { "scoped" } else { "full" },
            paths.len()
        );

        if let Err(e) = self.save_status_cache(&paths) {
            log::warn!("Status cache save failed (status will continue): {e}");
        }

        Ok(())
    }

    /// Re-read stashes and history when forced or when HEAD or the stash
    /// moved since they were last read; `None` keeps the published values.
    async fn refresh_history(&self, force: bool) -> Option<HistoryRead> {
        let marks = HistoryMarks {
            head: self.plumbing.resolve_ref("HEAD").await.ok(),
            stash: self.plumbing.resolve_ref(STASH_REF).await.ok(),
        };

        let mut last = self.history_marks.lock().await;
        if !force && last.as_ref() == Some(&marks) {
            log::trace!("History of {} unchanged, reusing it", self.repo);
            return None;
        }

        let read = HistoryRead {
            stashes: self.plumbing.stash(StashOp::List).await,
            stash_files: self.stash_status().await,
            commits: self.plumbing.log(None, None).await,
        };
        *last = read.is_complete().then_some(marks);
        Some(read)
    }

    /// Flag files that still carry conflict markers. Unreadable files are skipped.
    async fn mark_conflicts(&self, files: &mut [ModifiedFile]) {
        for file in files.iter_mut().filter(|file| file.status.may_hold_conflict()) {
            match self.vfs.read_to_string(&self.path_of(&file.name)).await {
                Ok(text) => file.has_merge_conflict = has_conflict_markers(&text),
                Err(e) => log::debug!("Skipping conflict scan of {}: {e}", file.name),
            }
        }
    }

    fn status_cache_dir(&self) -> PathBuf {
        let root = self.root();
        let key = self.vfs.real_path(&root).unwrap_or(root);
        let repo_hash = format!("{:x}", md5::compute(key.to_string_lossy().as_bytes()));

        log::debug!("status_cache_dir: repo = {key:?}, hash = {repo_hash}");
        self.config.cache_dir.join(repo_hash)
    }

    /// Path of the persisted modified-path list.
    pub fn status_cache_file(&self) -> PathBuf {
        self.status_cache_dir().join(CACHE_FILE)
    }

    pub fn save_status_cache(&self, paths: &[String]) -> Result<()> {
        let cache_dir = self.status_cache_dir();

        if let Err(e) = fs::create_dir_all(&cache_dir) {
            log::error!(
                "Failed to create cache directory '{}': {}",
                cache_dir.display(),
                e
            );
            return Err(SyncError::cache_directory_creation_failed(&cache_dir, e));
        }

        let cache_file = cache_dir.join(CACHE_FILE);
        let json = serde_json::to_string_pretty(paths).map_err(|e| {
            log::error!("Failed to serialize status cache: {e}");
            SyncError::cache_serialization_failed(e)
        })?;

        if let Err(e) = fs::write(&cache_file, json) {
            log::error!(
                "Failed to write cache file '{}': {}",
                cache_file.display(),
                e
            );
            return Err(SyncError::cache_write_failed(&cache_file, e));
        }

        log::debug!("Cached {} modified paths", paths.len());
        Ok(())
    }

    pub fn load_status_cache(&self) -> Result<Vec<String>> {
        let cache_file = self.status_cache_file();
        log::debug!("Looking for status cache: {}", cache_file.display());

        if !cache_file.exists() {
            return Err(SyncError::cache_file_not_found(&cache_file));
        }

        let content = fs::read_to_string(&cache_file).map_err(|e| {
            log::error!(
                "Failed to read cache file '{}': {}",
                cache_file.display(),
                e
            );
            SyncError::cache_read_failed(&cache_file, e)
        })?;

        let paths: Vec<String> = serde_json::from_str(&content).map_err(|e| {
            log::error!(
                "Failed to parse cache file '{}': {}",
                cache_file.display(),
                e
            );
            SyncError::cache_parse_failed(&cache_file, e)
        })?;

        log::debug!("Loaded {} cached paths", paths.len());
        Ok(paths)
    }
}
