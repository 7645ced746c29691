//! Pull, push and the merge-conflict state machine.
//!
//! ```text
//! Clean --pull--> FetchingAndMerging --ok--> Clean
//!                        |
//!                        +--conflict (merge attempted)--> ConflictPresent
//! ConflictPresent --complete_merge--> Clean
//! ```
//!
//! `ConflictPresent` is persisted as the conflict sentinel file, so it
//! survives restarts; its presence always wins when reporting the state.

use crate::core::error::{Result, SyncError};
use crate::core::plumbing::{CommitRequest, MergeOutcome, RemoteOptions};
use crate::core::session::RepoSession;
use crate::core::state::Author;
use serde::{Deserialize, Serialize};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeState {
    Clean,
    FetchingAndMerging,
    ConflictPresent,
}

/// Message returned when a merge stops on conflicts.
fn conflict_message(cause: &str) -> String {
    let cause = if cause.trim().is_empty() {
        "Merge has failed."
    } else {
        cause.trim()
    };

    [
        cause,
        "The merge conflicts will be displayed in the file status view.",
        "Please manually fix the files marked as having merge conflicts.",
        "Once complete, complete the merge to finalize it.",
    ]
    .join("\n")
}

impl RepoSession {
    /// Remote options for the configured remote and the current branch.
    pub async fn remote_options(&self) -> Result<RemoteOptions> {
        Ok(RemoteOptions::new(
            self.config.remote_name.clone(),
            self.branch_or_default().await?,
        ))
    }

    pub async fn merge_state(&self) -> Result<MergeState> {
        if self.vfs.exists(&self.sentinel_path()).await? {
            Ok(MergeState::ConflictPresent)
        } else if self.merge_flight.is_in_flight() {
            Ok(MergeState::FetchingAndMerging)
        } else {
            Ok(MergeState::Clean)
        }
    }

    pub async fn fetch(&self, remote: &RemoteOptions) -> Result<()> {
        self.plumbing.fetch(remote).await
    }

    /// Fetch and merge the remote branch.
    ///
    /// A conflicting merge is rolled back. With `attempt_merge` it is then
    /// retried leaving conflict markers in place (see
    /// [`attempt_conflicted_merge`](Self::attempt_conflicted_merge)); without
    /// it the pull fails with [`SyncError::MergeConflictNotAttempted`].
    pub async fn pull(&self, remote: &RemoteOptions, attempt_merge: bool) -> Result<MergeOutcome> {
        let Some(_flight) = self.merge_flight.try_begin() else {
            log::warn!("Pull of {} refused: another merge is running", remote.branch);
            return Err(SyncError::PullInProgress);
        };
        let author = self.commit_author().await;

        let outcome = match self.plumbing.pull(remote, &author).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_merge_conflict() => {
                if !attempt_merge {
                    log::warn!("Pull of {} stopped on conflicts: {e}", remote.branch);
                    return Err(SyncError::MergeConflictNotAttempted);
                }
                self.merge_leaving_conflicts(remote).await?
            }
            Err(e) => {
                log::error!("Pull of {} from {} failed: {e}", remote.branch, remote.remote);
                return Err(e);
            }
        };

        log::info!("Pulled {} from {}: {outcome:?}", remote.branch, remote.remote);
        self.full_resolve().await?;
        Ok(outcome)
    }

    /// Merge the remote branch leaving conflict markers in the working tree.
    ///
    /// On failure the conflict sentinel records the cause and a
    /// [`SyncError::MergeConflict`] explaining how to proceed is returned.
    pub async fn attempt_conflicted_merge(&self, remote: &RemoteOptions) -> Result<MergeOutcome> {
        let Some(_flight) = self.merge_flight.try_begin() else {
            return Err(SyncError::PullInProgress);
        };
        self.merge_leaving_conflicts(remote).await
    }

    /// Body of [`attempt_conflicted_merge`](Self::attempt_conflicted_merge);
    /// the caller holds the merge flight.
    async fn merge_leaving_conflicts(&self, remote: &RemoteOptions) -> Result<MergeOutcome> {
        let author = self.commit_author().await;

        let result = match self.plumbing.fetch(remote).await {
            Ok(()) => {
                self.plumbing
                    .merge(&remote.branch, &remote.tracking_ref(), false, &author)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let cause = e.to_string();
                self.vfs
                    .write_file_all(&self.sentinel_path(), cause.as_bytes())
                    .await?;
                log::warn!("Merge of {} left conflicts: {cause}", remote.branch);

                if let Err(resolve_err) = self.full_resolve().await {
                    log::warn!("Status refresh after conflicted merge failed: {resolve_err}");
                }
                Err(SyncError::merge_conflict(conflict_message(&cause)))
            }
        }
    }

    /// Record the resolved merge as a commit with the local and remote-tracking
    /// heads as parents, then leave the conflict state.
    pub async fn complete_merge(&self, author: &Author, branch: &str) -> Result<String> {
        let remote = &self.config.remote_name;
        let request = CommitRequest {
            message: format!("Merge '{branch}' into {remote} {branch}"),
            author: author.clone(),
            parents: Some(vec![branch.to_string(), self.config.remote_ref(branch)]),
        };

        let oid = self.plumbing.commit(&request).await?;

        match self.vfs.unlink(&self.sentinel_path()).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        log::info!("Completed merge of {branch} as {oid}");
        self.full_resolve().await?;
        Ok(oid)
    }

    pub async fn push(&self, remote: &RemoteOptions, force: bool) -> Result<()> {
        match self.plumbing.push(remote, force).await {
            Ok(()) => {
                self.full_resolve().await?;
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                log::error!("Nothing to push for {}: {e}", remote.branch);
                Err(SyncError::NoBranchToPush)
            }
            Err(e) => {
                log::error!("Push of {} to {} failed: {e}", remote.branch, remote.remote);
                Err(e)
            }
        }
    }
}
