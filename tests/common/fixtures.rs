//! Test data generation utilities and predefined scenarios
//!
//! Provides repositories and course documents in well-known states.

#![allow(dead_code)]

use super::repository::*;
use course_git_sync::commands::GitConfig;
use course_git_sync::core::{AssignableUnit, Block, Course, CourseDocument, Slide};
use course_git_sync::{BackendKind, Result};
use std::path::PathBuf;

/// Scenario: three committed files, two of them modified, plus two untracked
pub async fn create_multi_file_repo() -> Result<TestRepo> {
    create_multi_file_repo_on(BackendKind::Persistent).await
}

/// [`create_multi_file_repo`] on the given backend
pub async fn create_multi_file_repo_on(backend: BackendKind) -> Result<TestRepo> {
    let repo = setup_test_repo_on(backend).await?;

    for (i, name) in ["file1.md", "file2.md", "file3.md"].iter().enumerate() {
        repo.write(name, &format!("content{}\nline 2\n", i + 1))?;
    }
    repo.session.stage_all(false, None).await?;
    repo.session.commit("Initial commit", None).await?;

    repo.write("file1.md", "modified1\n")?;
    repo.write("file2.md", "modified2\n")?;
    repo.write("file4.md", "new4\n")?;
    repo.write("notes/file5.md", "new5\n")?;

    Ok(repo)
}

/// A course with one unit of two slides, laid out as committed files
pub fn sample_course() -> Course {
    Course {
        base_path: "intro-course".to_string(),
        data: CourseDocument {
            course_title: "Intro Course".to_string(),
            rc5_version: "1.0".to_string(),
            blocks: vec![Block {
                block_name: "intro-course".to_string(),
                aus: vec![AssignableUnit {
                    au_name: "Old AU Title".to_string(),
                    dir_path: "intro-course/old-au-title".to_string(),
                    slides: vec![
                        Slide::markdown("Welcome", "intro-course/old-au-title/welcome.md"),
                        Slide::markdown("Summary", "intro-course/old-au-title/summary.md"),
                    ],
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        },
    }
}

/// Writes and commits the files of [`sample_course`]
pub async fn commit_sample_course(repo: &TestRepo) -> Result<Course> {
    let course = sample_course();
    repo.write("intro-course/RC5.yaml", &course.data.to_yaml()?)?;
    repo.write("intro-course/old-au-title/welcome.md", "# Welcome\n")?;
    repo.write("intro-course/old-au-title/summary.md", "# Summary\n")?;

    repo.session.stage_all(false, None).await?;
    repo.session.commit("Add course", None).await?;
    Ok(course)
}

/// Scenario: a committed repository pushed to a fresh bare remote, plus a
/// plain git clone of that remote acting as another author
pub async fn repo_with_remote(backend: BackendKind) -> Result<(TestRepo, PathBuf)> {
    let repo = setup_test_repo_with_initial_commit_on(backend).await?;
    let remote = setup_bare_remote(repo.temp_dir.path())?;

    repo.session
        .set_git_config(&GitConfig {
            remote_url: Some(remote.to_string_lossy().into_owned()),
            ..Default::default()
        })
        .await?;
    repo.session
        .push(&repo.session.remote_options().await?, false)
        .await?;

    let other = clone_with_git(&remote, repo.temp_dir.path(), "other")?;
    Ok((repo, other))
}

/// Scenario: `path` edited both remotely (pushed) and locally (committed)
pub async fn diverge_on(repo: &TestRepo, other: &std::path::Path, path: &str) -> Result<()> {
    create_file(repo.path(), path, "base\n")?;
    repo.session.stage_file(path).await?;
    repo.session.commit("Add shared file", None).await?;
    repo.session
        .push(&repo.session.remote_options().await?, false)
        .await?;
    git(other, &["pull", "-q", "origin", TEST_BRANCH])?;

    commit_and_push_with_git(other, path, "theirs\n", "Remote edit")?;

    repo.write(path, "ours\n")?;
    repo.session.stage_file(path).await?;
    repo.session.commit("Local edit", None).await?;
    Ok(())
}
