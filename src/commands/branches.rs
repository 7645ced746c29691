//! History, branches, repository git configuration and per-file inspection.

use crate::core::error::{Result, SyncError};
use crate::core::plumbing::CommitRequest;
use crate::core::session::RepoSession;
use crate::core::state::{Author, CommitInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;

/// Identity and remote settings stored in the repository's git config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitConfig {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub remote_url: Option<String>,
}

/// HEAD and working-tree versions of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    /// Content at HEAD; empty for files HEAD does not track.
    pub old: String,
    /// Working-tree content; empty for deleted files.
    pub new: String,
}

impl RepoSession {
    /// Identity for new commits: the repository's `user.*` settings, else the engine default.
    pub async fn commit_author(&self) -> Author {
        let name = self.plumbing.get_config("user.name").await.ok().flatten();
        let email = self.plumbing.get_config("user.email").await.ok().flatten();

        Author::new(
            name.unwrap_or_else(|| self.config.author.name.clone()),
            email.unwrap_or_else(|| self.config.author.email.clone()),
        )
    }

    /// Commit the index on top of HEAD and return the new commit id.
    pub async fn commit(&self, message: &str, author: Option<&Author>) -> Result<String> {
        let author = match author {
            Some(author) => author.clone(),
            None => self.commit_author().await,
        };

        let oid = self
            .plumbing
            .commit(&CommitRequest {
                message: message.to_string(),
                author,
                parents: None,
            })
            .await?;

        self.full_resolve().await?;
        Ok(oid)
    }

    /// History of HEAD, newest first.
    pub async fn log(&self, depth: Option<usize>) -> Result<Vec<CommitInfo>> {
        self.plumbing.log(None, depth).await
    }

    pub async fn last_commit_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .plumbing
            .log(None, Some(1))
            .await?
            .first()
            .map(|commit| commit.timestamp))
    }

    pub async fn list_branches(&self) -> Result<Vec<String>> {
        self.plumbing.list_branches().await
    }

    pub async fn current_branch(&self) -> Result<Option<String>> {
        self.plumbing.current_branch().await
    }

    /// Current branch, or the configured default when HEAD is detached.
    pub async fn branch_or_default(&self) -> Result<String> {
        Ok(self
            .current_branch()
            .await?
            .unwrap_or_else(|| self.config.default_branch.clone()))
    }

    pub async fn checkout_branch(&self, name: &str) -> Result<()> {
        self.plumbing.checkout(name, false).await?;
        self.cache.clear();
        log::info!("Switched {} to {name}", self.repo);
        self.full_resolve().await
    }

    /// Move the current branch to `commit` and discard working-tree changes.
    pub async fn reset_to_commit(&self, commit: &str) -> Result<()> {
        let branch = self
            .current_branch()
            .await?
            .ok_or_else(|| SyncError::not_found("current branch"))?;

        self.plumbing
            .write_ref(&format!("refs/heads/{branch}"), commit, true)
            .await?;
        self.plumbing.checkout(&branch, true).await?;
        self.cache.clear();

        log::info!("Reset {branch} of {} to {commit}", self.repo);
        self.full_resolve().await
    }

    /// Number of local commits on `branch` the remote-tracking branch lacks.
    ///
    /// Without a remote-tracking branch every commit counts.
    pub async fn commits_to_push(&self, branch: &str) -> Result<usize> {
        let local = self.plumbing.log(Some(branch), None).await?;
        let remote_ref = self.config.remote_ref(branch);

        if self.plumbing.resolve_ref(&remote_ref).await.is_err() {
            return Ok(local.len());
        }

        let remote: HashSet<String> = self
            .plumbing
            .log(Some(&remote_ref), None)
            .await?
            .into_iter()
            .map(|commit| commit.oid)
            .collect();

        Ok(local
            .iter()
            .filter(|commit| !remote.contains(&commit.oid))
            .count())
    }

    /// Restore a file's HEAD content in the working tree and the index.
    pub async fn revert_file_to_head(&self, path: &str) -> Result<()> {
        let blob = self.plumbing.read_blob("HEAD", path).await?;
        self.vfs.write_file_all(&self.path_of(path), &blob).await?;
        self.plumbing.add(&[path.to_string()]).await?;

        log::info!("Reverted {path} to HEAD");
        self.resolve_file(path).await
    }

    pub async fn file_diff(&self, path: &str) -> Result<FileDiff> {
        let old = match self.plumbing.read_blob("HEAD", path).await {
            Ok(blob) => String::from_utf8_lossy(&blob).into_owned(),
            Err(e) if e.is_not_found() => String::new(),
            Err(e) => return Err(e),
        };

        let new = match self.vfs.read_file(&self.path_of(path)).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(FileDiff {
            path: path.to_string(),
            old,
            new,
        })
    }

    /// Write identity and remote settings. Unset fields are left alone.
    pub async fn set_git_config(&self, settings: &GitConfig) -> Result<()> {
        if let Some(name) = &settings.author_name {
            self.plumbing.set_config("user.name", name).await?;
        }
        if let Some(email) = &settings.author_email {
            self.plumbing.set_config("user.email", email).await?;
        }

        if let Some(url) = &settings.remote_url {
            let remote = &self.config.remote_name;
            let exists = self
                .plumbing
                .list_remotes()
                .await?
                .iter()
                .any(|candidate| &candidate.name == remote);

            if exists {
                self.plumbing
                    .set_config(&format!("remote.{remote}.url"), url)
                    .await?;
            } else {
                self.plumbing.add_remote(remote, url).await?;
            }
            log::info!("Remote {remote} of {} set to {url}", self.repo);
        }

        Ok(())
    }

    pub async fn git_config(&self) -> Result<GitConfig> {
        let remote_url = self
            .plumbing
            .list_remotes()
            .await?
            .into_iter()
            .find(|remote| remote.name == self.config.remote_name)
            .map(|remote| remote.url);

        Ok(GitConfig {
            author_name: self.plumbing.get_config("user.name").await?,
            author_email: self.plumbing.get_config("user.email").await?,
            remote_url,
        })
    }
}
