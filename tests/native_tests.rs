//! The native backend drives the `git` executable instead of libgit2.

use course_git_sync::commands::{GitConfig, MergeState};
use course_git_sync::core::{BackendKind, DeltaLog};
use course_git_sync::{FileStatus, SyncError};
use predicates::prelude::*;

mod common;
use common::{assertions::*, fixtures::*, repository::*};

#[cfg(test)]
mod native_tests {
    use super::*;

    #[tokio::test]
    async fn test_native_session_uses_cli_plumbing() -> anyhow::Result<()> {
        let repo = setup_test_repo_on(BackendKind::Native).await?;

        assert_eq!(repo.session.plumbing().name(), "git-cli");
        assert!(!repo.session.plumbing().supports_batch_add());
        assert!(repo.path().starts_with(repo.temp_dir.path().join("native")));
        assert_eq!(repo.git(&["symbolic-ref", "--short", "HEAD"])?.trim(), TEST_BRANCH);

        Ok(())
    }

    #[tokio::test]
    async fn test_native_file_lifecycle() -> anyhow::Result<()> {
        let repo = setup_test_repo_on(BackendKind::Native).await?;
        let session = &repo.session;

        repo.write("a.md", "first\n")?;
        repo.write("unit/b.md", "bee\n")?;
        session.full_resolve().await?;
        assert_modified_set(
            &session.snapshot(),
            &[("a.md", FileStatus::Untracked), ("unit/b.md", FileStatus::Untracked)],
        );

        session.stage_all(true, None).await?;
        assert_modified_set(
            &session.snapshot(),
            &[("a.md", FileStatus::Added), ("unit/b.md", FileStatus::Added)],
        );

        session.commit("Add files", None).await?;
        assert!(session.snapshot().modified_files.is_empty());
        let log = session.log(None).await?;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].summary(), "Add files");
        assert_eq!(log[0].author.email, TEST_EMAIL);

        repo.write("a.md", "second\n")?;
        session.resolve_file("a.md").await?;
        assert_eq!(status_of(&session.snapshot(), "a.md"), Some(FileStatus::Modified));

        session.stage_file("a.md").await?;
        assert_eq!(status_of(&session.snapshot(), "a.md"), Some(FileStatus::Staged));

        repo.write("a.md", "third\n")?;
        session.full_resolve().await?;
        assert_eq!(
            status_of(&session.snapshot(), "a.md"),
            Some(FileStatus::StagedWithChanges)
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_native_stash_round_trip() -> anyhow::Result<()> {
        let repo = setup_test_repo_on(BackendKind::Native).await?;
        let session = &repo.session;
        repo.write("a.md", "first\n")?;
        repo.write("b.md", "bee\n")?;
        session.stage_all(false, None).await?;
        session.commit("Initial", None).await?;

        repo.write("a.md", "changed\n")?;
        repo.remove("b.md")?;
        session.stage_file("b.md").await?;
        session.full_resolve().await?;
        let before = session.snapshot().modified_files;

        session.stash_push().await?;
        assert!(session.snapshot().modified_files.is_empty());
        assert_eq!(session.snapshot().stashes.len(), 1);

        session.stash_pop().await?;
        assert_eq!(session.snapshot().modified_files, before);
        assert!(!repo.exists("b.md"));

        Ok(())
    }

    #[tokio::test]
    async fn test_native_config_and_course_sync() -> anyhow::Result<()> {
        let repo = setup_test_repo_on(BackendKind::Native).await?;
        let session = &repo.session;

        session
            .set_git_config(&GitConfig {
                author_name: Some("Native Author".to_string()),
                ..Default::default()
            })
            .await?;
        assert_eq!(
            session.git_config().await?.author_name.as_deref(),
            Some("Native Author")
        );

        let mut course = commit_sample_course(&repo).await?;
        course.data.blocks[0].aus[0].au_name = "Renamed Unit".to_string();
        let outcome = session.synchronize_course(&course, &DeltaLog::new()).await?;

        assert_eq!(outcome.document.blocks[0].aus[0].dir_path, "intro-course/renamed-unit");
        assert_eq!(
            status_of(&session.snapshot(), "intro-course/renamed-unit/welcome.md"),
            Some(FileStatus::Untracked)
        );
        assert_eq!(
            status_of(&session.snapshot(), "intro-course/old-au-title/summary.md"),
            Some(FileStatus::DeletedUnstaged)
        );

        let log = session.log(None).await?;
        assert_eq!(log[0].author.name, "Native Author");

        Ok(())
    }

    #[tokio::test]
    async fn test_native_scoped_resolve_matches_full_resolve() -> anyhow::Result<()> {
        let repo = create_multi_file_repo_on(BackendKind::Native).await?;
        let session = &repo.session;
        session.full_resolve().await?;

        repo.write("file3.md", "changed later\n")?;
        repo.remove("file4.md")?;
        repo.write("notes/file6.md", "another\n")?;
        repo.write("outside.md", "not in scope\n")?;

        session
            .scoped_resolve(&["file3.md".to_string(), "file4.md".to_string(), "notes".to_string()])
            .await?;
        let scoped = session.snapshot().modified_files;
        assert!(!scoped.iter().any(|file| file.name == "outside.md"));

        repo.remove("outside.md")?;
        session.full_resolve().await?;
        let full = session.snapshot().modified_files;

        assert_eq!(scoped, full);
        assert!(full.iter().any(|file| file.name == "notes/file6.md"));
        assert!(!full.iter().any(|file| file.name == "file4.md"));

        Ok(())
    }

    #[tokio::test]
    async fn test_native_conflicting_pull_is_rolled_back() -> anyhow::Result<()> {
        let (repo, other) = repo_with_remote(BackendKind::Native).await?;
        diverge_on(&repo, &other, "errors/404.md").await?;

        let result = repo
            .session
            .pull(&repo.session.remote_options().await?, false)
            .await;

        assert!(matches!(result, Err(SyncError::MergeConflictNotAttempted)));
        assert_eq!(repo.read("errors/404.md")?, "ours\n");
        assert!(!repo.exists(".git/MERGE_HEAD"));
        assert!(!repo.exists(".git/failedMerge.txt"));
        assert_eq!(repo.session.merge_state().await?, MergeState::Clean);

        Ok(())
    }

    #[tokio::test]
    async fn test_native_conflicted_merge_records_sentinel() -> anyhow::Result<()> {
        let (repo, other) = repo_with_remote(BackendKind::Native).await?;
        diverge_on(&repo, &other, "auth/401.md").await?;

        let error = repo
            .session
            .pull(&repo.session.remote_options().await?, true)
            .await
            .expect_err("conflicting merge must fail");

        assert!(error.is_merge_conflict());
        assert!(merge_conflict_guidance().eval(&error.to_string()));
        assert!(repo.exists(".git/failedMerge.txt"));
        assert!(repo.read("auth/401.md")?.contains("<<<<<<<"));
        assert_eq!(repo.session.merge_state().await?, MergeState::ConflictPresent);

        Ok(())
    }
}
