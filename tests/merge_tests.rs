use course_git_sync::commands::MergeState;
use course_git_sync::core::MergeOutcome;
use course_git_sync::{Author, BackendKind, SyncError};
use predicates::prelude::*;

mod common;
use common::{assertions::*, fixtures::*, repository::*};

#[cfg(test)]
mod merge_tests {
    use super::*;

    #[tokio::test]
    async fn test_push_records_remote_and_counts_commits() -> anyhow::Result<()> {
        let (repo, _other) = repo_with_remote(BackendKind::Persistent).await?;
        let session = &repo.session;

        let config = session.git_config().await?;
        assert!(config.remote_url.is_some());
        assert_eq!(config.author_name.as_deref(), Some(TEST_USER));
        assert_eq!(session.commits_to_push(TEST_BRANCH).await?, 0);

        repo.write("local.md", "local\n")?;
        session.stage_file("local.md").await?;
        session.commit("Local change", None).await?;
        assert_eq!(session.commits_to_push(TEST_BRANCH).await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_pull_fast_forwards() -> anyhow::Result<()> {
        let (repo, other) = repo_with_remote(BackendKind::Persistent).await?;
        commit_and_push_with_git(&other, "unit/remote.md", "from remote\n", "Remote change")?;

        let outcome = repo
            .session
            .pull(&repo.session.remote_options().await?, false)
            .await?;

        assert!(matches!(outcome, MergeOutcome::FastForward { .. }));
        assert_eq!(repo.read("unit/remote.md")?, "from remote\n");
        assert!(repo.session.snapshot().modified_files.is_empty());
        assert_eq!(repo.session.merge_state().await?, MergeState::Clean);

        Ok(())
    }

    #[tokio::test]
    async fn test_push_behind_remote_is_rejected() -> anyhow::Result<()> {
        let (repo, other) = repo_with_remote(BackendKind::Persistent).await?;
        commit_and_push_with_git(&other, "remote.md", "from remote\n", "Remote change")?;

        repo.write("local.md", "local\n")?;
        repo.session.stage_file("local.md").await?;
        repo.session.commit("Local change", None).await?;

        let error = repo
            .session
            .push(&repo.session.remote_options().await?, false)
            .await
            .expect_err("push behind the remote must fail");
        assert!(matches!(error, SyncError::NotFastForward));
        assert!(pull_first().eval(&error.to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn test_conflicting_pull_without_merge_leaves_tree_alone() -> anyhow::Result<()> {
        let (repo, other) = repo_with_remote(BackendKind::Persistent).await?;
        commit_and_push_with_git(&other, "initial.txt", "theirs\n", "Remote edit")?;

        repo.write("initial.txt", "ours\n")?;
        repo.session.stage_file("initial.txt").await?;
        repo.session.commit("Local edit", None).await?;

        let result = repo
            .session
            .pull(&repo.session.remote_options().await?, false)
            .await;

        assert!(matches!(result, Err(SyncError::MergeConflictNotAttempted)));
        assert_eq!(repo.read("initial.txt")?, "ours\n");
        assert_eq!(repo.session.merge_state().await?, MergeState::Clean);

        Ok(())
    }

    #[tokio::test]
    async fn test_conflicted_merge_then_complete() -> anyhow::Result<()> {
        let (repo, other) = repo_with_remote(BackendKind::Persistent).await?;
        let session = &repo.session;
        commit_and_push_with_git(&other, "initial.txt", "theirs\n", "Remote edit")?;

        repo.write("initial.txt", "ours\n")?;
        session.stage_file("initial.txt").await?;
        session.commit("Local edit", None).await?;

        let error = session
            .pull(&session.remote_options().await?, true)
            .await
            .expect_err("conflicting merge must fail");
        assert!(error.is_merge_conflict());
        assert!(merge_conflict_guidance().eval(&error.to_string()));

        assert_eq!(session.merge_state().await?, MergeState::ConflictPresent);
        let snapshot = session.snapshot();
        assert!(snapshot.is_in_merge);
        assert!(snapshot.file("initial.txt").is_some_and(|file| file.has_merge_conflict));
        assert!(repo.read("initial.txt")?.contains("<<<<<<<"));

        repo.write("initial.txt", "resolved\n")?;
        session.stage_file("initial.txt").await?;
        session
            .complete_merge(&Author::new(TEST_USER, TEST_EMAIL), TEST_BRANCH)
            .await?;

        assert_eq!(session.merge_state().await?, MergeState::Clean);
        assert!(!session.snapshot().is_in_merge);
        assert!(!repo.exists(".git/failedMerge.txt"));
        assert!(session
            .log(None)
            .await?
            .iter()
            .any(|commit| commit.parents.len() == 2));

        session.push(&session.remote_options().await?, false).await?;
        assert_eq!(session.commits_to_push(TEST_BRANCH).await?, 0);

        Ok(())
    }
}
