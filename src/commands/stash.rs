//! Stash manager.
//!
//! A single stash slot is exposed: push saves tracked changes (index state
//! included), pop restores them exactly, drop discards them.

use crate::core::error::Result;
use crate::core::file_status::FileStatus;
use crate::core::plumbing::StashOp;
use crate::core::session::RepoSession;
use crate::core::state::ModifiedFile;
use std::io;

pub(crate) const STASH_REF: &str = "refs/stash";

impl RepoSession {
    pub async fn stash_list(&self) -> Result<Vec<String>> {
        self.plumbing.stash(StashOp::List).await
    }

    pub async fn stash_push(&self) -> Result<()> {
        let message = self.config.stash_message.clone();
        self.plumbing.stash(StashOp::Push { message }).await?;
        log::info!("Stashed changes in {}", self.repo);
        self.full_resolve().await
    }

    pub async fn stash_pop(&self) -> Result<()> {
        if self.config.stash_pop_removes_deleted {
            self.remove_stash_deleted_files().await?;
        }

        self.plumbing.stash(StashOp::Pop).await?;
        log::info!("Popped stash in {}", self.repo);
        self.full_resolve().await
    }

    pub async fn stash_drop(&self) -> Result<()> {
        self.plumbing.stash(StashOp::Drop).await?;
        log::info!("Dropped stash in {}", self.repo);
        self.full_resolve().await
    }

    /// Files changed by the stash relative to HEAD.
    ///
    /// Present only in the stash: `added`; only in HEAD: `deleted_staged`;
    /// in both with different content: `modified`. Without a stash the list
    /// is empty.
    pub async fn stash_status(&self) -> Result<Vec<ModifiedFile>> {
        if self.plumbing.resolve_ref(STASH_REF).await.is_err() {
            return Ok(Vec::new());
        }

        let rows = self.plumbing.walk(&["HEAD", STASH_REF]).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let status = match (row.oids.first()?, row.oids.get(1)?) {
                    (None, Some(_)) => FileStatus::Added,
                    (Some(_), None) => FileStatus::DeletedStaged,
                    (Some(head), Some(stash)) if head != stash => FileStatus::Modified,
                    _ => return None,
                };
                Some(ModifiedFile::new(row.path, status))
            })
            .collect())
    }

    /// Delete the working-tree copies of files the stash records as deleted.
    ///
    /// Popping over a file that the stash deletes leaves it behind otherwise.
    async fn remove_stash_deleted_files(&self) -> Result<()> {
        let deleted: Vec<String> = self
            .stash_status()
            .await?
            .into_iter()
            .filter(|file| file.status == FileStatus::DeletedStaged)
            .map(|file| file.name)
            .collect();

        for path in deleted {
            match self.vfs.unlink(&self.path_of(&path)).await {
                Ok(()) => log::debug!("Removed {path} before popping stash"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
