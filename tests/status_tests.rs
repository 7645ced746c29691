use course_git_sync::FileStatus;
use std::fs;

mod common;
use common::{assertions::*, fixtures::*, repository::*};

#[cfg(test)]
mod status_tests {
    use super::*;

    #[tokio::test]
    async fn test_file_lifecycle_through_statuses() -> anyhow::Result<()> {
        let repo = setup_test_repo().await?;
        let session = &repo.session;

        repo.write("a.md", "first\n")?;
        session.full_resolve().await?;
        assert_eq!(status_of(&session.snapshot(), "a.md"), Some(FileStatus::Untracked));

        session.stage_file("a.md").await?;
        assert_eq!(status_of(&session.snapshot(), "a.md"), Some(FileStatus::Added));

        session.commit("Add a.md", None).await?;
        let snapshot = session.snapshot();
        assert!(snapshot.modified_files.is_empty());
        assert_eq!(session.log(None).await?.len(), 1);
        assert_eq!(snapshot.commits.len(), 1);

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
    async fn test_full_resolve_lists_every_change() -> anyhow::Result<()> {
        let repo = create_multi_file_repo().await?;
        repo.session.full_resolve().await?;

        assert_modified_set(
            &repo.session.snapshot(),
            &[
                ("file1.md", FileStatus::Modified),
                ("file2.md", FileStatus::Modified),
                ("file4.md", FileStatus::Untracked),
                ("notes/file5.md", FileStatus::Untracked),
            ],
        );

        // Display order: tracked changes before untracked files
        let names: Vec<String> = repo.session.snapshot().paths();
        assert_eq!(names, vec!["file1.md", "file2.md", "file4.md", "notes/file5.md"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_scoped_resolve_matches_full_resolve() -> anyhow::Result<()> {
        let repo = create_multi_file_repo().await?;
        let session = &repo.session;
        session.full_resolve().await?;

        repo.write("file3.md", "changed later\n")?;
        repo.remove("file4.md")?;
        repo.write("notes/file6.md", "another\n")?;

        session
            .scoped_resolve(&["file3.md".to_string(), "file4.md".to_string(), "notes".to_string()])
            .await?;
        let scoped = session.snapshot().modified_files;

        session.full_resolve().await?;
        let full = session.snapshot().modified_files;

        assert_eq!(scoped, full);
        assert!(full.iter().any(|file| file.name == "notes/file6.md"));
        assert!(!full.iter().any(|file| file.name == "file4.md"));

        Ok(())
    }

    #[tokio::test]
    async fn test_empty_scope_is_a_no_op() -> anyhow::Result<()> {
        // The set was last resolved right after the commit, before the edits
        let repo = create_multi_file_repo().await?;
        let before = repo.session.snapshot();

        repo.session.scoped_resolve(&[]).await?;

        assert!(before.modified_files.is_empty());
        assert_eq!(repo.session.snapshot(), before);

        Ok(())
    }

    #[tokio::test]
    async fn test_deleted_files_are_reported_and_staged() -> anyhow::Result<()> {
        let repo = setup_test_repo_with_initial_commit().await?;
        repo.remove("initial.txt")?;

        repo.session.full_resolve().await?;
        assert_eq!(
            status_of(&repo.session.snapshot(), "initial.txt"),
            Some(FileStatus::DeletedUnstaged)
        );

        repo.session.stage_all(true, None).await?;
        assert_eq!(
            status_of(&repo.session.snapshot(), "initial.txt"),
            Some(FileStatus::DeletedStaged)
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_status_cache_persists_modified_paths() -> anyhow::Result<()> {
        let repo = create_multi_file_repo().await?;
        repo.session.full_resolve().await?;

        let cache_file = repo.session.status_cache_file();
        assert!(cache_file.starts_with(repo.temp_dir.path().join("cache")));

        let cached: Vec<String> = serde_json::from_str(&fs::read_to_string(&cache_file)?)?;
        assert_eq!(cached, repo.session.snapshot().paths());
        assert_eq!(repo.session.load_status_cache()?, cached);

        Ok(())
    }

    #[tokio::test]
    async fn test_cold_start_restores_status_in_new_session() -> anyhow::Result<()> {
        let repo = create_multi_file_repo().await?;
        repo.session.full_resolve().await?;
        let expected = repo.session.snapshot().modified_files;

        let reopened = repo.engine.open(repo.session.repo())?;
        assert!(reopened.snapshot().modified_files.is_empty());

        reopened.cold_start_resolve().await?;
        assert_eq!(reopened.snapshot().modified_files, expected);

        Ok(())
    }

    #[tokio::test]
    async fn test_conflict_markers_flagged_only_during_merge() -> anyhow::Result<()> {
        let repo = setup_test_repo_with_initial_commit().await?;
        let conflicted = "<<<<<<< HEAD\nours\n=======\ntheirs\n>>>>>>> origin/main\n";
        repo.write("initial.txt", conflicted)?;

        repo.session.full_resolve().await?;
        let snapshot = repo.session.snapshot();
        assert!(!snapshot.is_in_merge);
        assert!(!snapshot.has_merge_conflicts());

        repo.write(".git/failedMerge.txt", "Merge conflict in initial.txt")?;
        repo.session.full_resolve().await?;
        let snapshot = repo.session.snapshot();
        assert!(snapshot.is_in_merge);
        assert!(snapshot.has_merge_conflicts());
        assert!(snapshot.file("initial.txt").is_some_and(|file| file.has_merge_conflict));

        Ok(())
    }
}
