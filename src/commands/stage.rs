//! Staging controller: moving changes into and out of the index.

use crate::commands::status::modified_files_from_rows;
use crate::core::error::{Result, SyncError};
use crate::core::file_status::FileStatus;
use crate::core::paths::in_scope;
use crate::core::session::RepoSession;
use crate::core::state::ModifiedFile;
use futures::future::join_all;

/// Changes that are staged by removing the path from the index.
fn needs_removal(status: FileStatus) -> bool {
    matches!(status, FileStatus::DeletedUnstaged | FileStatus::AddedThenDeleted)
}

/// Changes that are staged by adding the working-tree file.
fn needs_add(status: FileStatus) -> bool {
    !matches!(
        status,
        FileStatus::DeletedStaged | FileStatus::DeletedUnstaged | FileStatus::AddedThenDeleted
    )
}

/// Changes with an index entry that differs from HEAD.
fn has_index_changes(status: FileStatus) -> bool {
    status.is_staged()
        || matches!(
            status,
            FileStatus::AddedWithChanges | FileStatus::StagedWithChanges
        )
}

impl RepoSession {
    async fn candidate_files(
        &self,
        use_cached_list: bool,
        scope: Option<&[String]>,
    ) -> Result<Vec<ModifiedFile>> {
        if use_cached_list {
            let mut files = self.modified_files();
            files.retain(|file| in_scope(&file.name, scope));
            Ok(files)
        } else {
            let rows = self.plumbing.status_matrix(scope).await?;
            Ok(modified_files_from_rows(&rows))
        }
    }

    /// Stage every change, optionally limited to `scope`.
    ///
    /// With `use_cached_list` the published modified-file set is used instead
    /// of a fresh status query. Removals are best-effort; additions are a
    /// single index update when the plumbing supports it, otherwise one call
    /// per file with failures logged and skipped.
    pub async fn stage_all(&self, use_cached_list: bool, scope: Option<&[String]>) -> Result<()> {
        let files = self.candidate_files(use_cached_list, scope).await?;
        if files.is_empty() {
            log::debug!("Nothing to stage in {}", self.repo);
            return Ok(());
        }

        let to_remove: Vec<&str> = files
            .iter()
            .filter(|file| needs_removal(file.status))
            .map(|file| file.name.as_str())
            .collect();
        let to_add: Vec<String> = files
            .iter()
            .filter(|file| needs_add(file.status))
            .map(|file| file.name.clone())
            .collect();

        let removals = join_all(to_remove.iter().map(|path| async move {
            (*path, self.plumbing.remove(path).await)
        }))
        .await;
        for (path, result) in removals {
            if let Err(e) = result {
                log::warn!("Failed to remove {path} from the index: {e}");
            }
        }

        if !to_add.is_empty() {
            if self.plumbing.supports_batch_add() {
                self.plumbing.add(&to_add).await.map_err(|e| {
                    log::error!("Staging {} files failed: {e}", to_add.len());
                    SyncError::stage_failed(e.to_string())
                })?;
            } else {
                let additions = join_all(to_add.iter().map(|path| async move {
                    (path, self.plumbing.add(std::slice::from_ref(path)).await)
                }))
                .await;
                for (path, result) in additions {
                    if let Err(e) = result {
                        log::warn!("Failed to stage {path}: {e}");
                    }
                }
            }
        }

        log::info!("Staged {} changes in {}", files.len(), self.repo);
        let paths: Vec<String> = files.into_iter().map(|file| file.name).collect();
        self.scoped_resolve(&paths).await
    }

    /// Restore the index entry of every staged change to HEAD. Best-effort.
    pub async fn unstage_all(&self, use_cached_list: bool, scope: Option<&[String]>) -> Result<()> {
        let files = self.candidate_files(use_cached_list, scope).await?;
        let staged: Vec<String> = files
            .into_iter()
            .filter(|file| has_index_changes(file.status))
            .map(|file| file.name)
            .collect();
        if staged.is_empty() {
            log::debug!("Nothing to unstage in {}", self.repo);
            return Ok(());
        }

        let results = join_all(staged.iter().map(|path| async move {
            (path, self.plumbing.reset_index(path).await)
        }))
        .await;
        for (path, result) in results {
            if let Err(e) = result {
                log::warn!("Failed to unstage {path}: {e}");
            }
        }

        log::info!("Unstaged {} changes in {}", staged.len(), self.repo);
        self.scoped_resolve(&staged).await
    }

    /// Stage one path: add it when it exists, remove it from the index otherwise.
    pub async fn stage_file(&self, path: &str) -> Result<()> {
        if self.vfs.exists(&self.path_of(path)).await? {
            self.plumbing.add(&[path.to_string()]).await?;
        } else {
            self.plumbing.remove(path).await?;
        }

        log::debug!("Staged {path}");
        self.resolve_file(path).await
    }

    pub async fn unstage_file(&self, path: &str) -> Result<()> {
        self.plumbing.reset_index(path).await.map_err(|e| {
            log::error!("Failed to unstage {path}: {e}");
            SyncError::unstage_failed(path, &e)
        })?;

        log::debug!("Unstaged {path}");
        self.resolve_file(path).await
    }
}
