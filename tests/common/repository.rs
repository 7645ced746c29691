//! Repository setup and manipulation helpers
//!
//! Repositories are created through the engine inside a temporary directory;
//! remotes and the "other collaborator" side are driven with the `git`
//! executable.

#![allow(dead_code)]

use course_git_sync::commands::GitConfig;
use course_git_sync::{
    Author, BackendKind, Engine, EngineConfig, RepoAccessObject, RepoSession, Result, SyncError,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TEST_BRANCH: &str = "main";
pub const TEST_USER: &str = "Test User";
pub const TEST_EMAIL: &str = "test@example.com";

/// An engine-managed repository. The TempDir must be kept alive for the
/// duration of the test to prevent cleanup.
pub struct TestRepo {
    pub temp_dir: TempDir,
    pub engine: Engine,
    pub session: RepoSession,
    /// On-disk working tree.
    pub path: PathBuf,
}

impl TestRepo {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, relative: &str, content: &str) -> Result<()> {
        create_file(&self.path, relative, content)
    }

    pub fn read(&self, relative: &str) -> Result<String> {
        Ok(fs::read_to_string(self.path.join(relative))?)
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path.join(relative).exists()
    }

    pub fn remove(&self, relative: &str) -> Result<()> {
        Ok(fs::remove_file(self.path.join(relative))?)
    }

    /// Run `git` in the working tree.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        git(&self.path, args)
    }
}

/// Engine configuration with every root under `root` and a fixed identity.
pub fn test_config(root: &Path) -> EngineConfig {
    let mut config = EngineConfig::rooted_at(root);
    config.author = Author::new(TEST_USER, TEST_EMAIL);
    config
}

/// Sets up a fresh, empty repository on the given backend
pub async fn setup_test_repo_on(backend: BackendKind) -> Result<TestRepo> {
    super::init_test_logging();
    let temp_dir = TempDir::new()?;
    let engine = Engine::new(test_config(temp_dir.path()));
    let repo = RepoAccessObject::new(backend, "course-repo");

    let session = engine.init_repo(&repo, TEST_BRANCH).await?;
    session
        .set_git_config(&GitConfig {
            author_name: Some(TEST_USER.to_string()),
            author_email: Some(TEST_EMAIL.to_string()),
            remote_url: None,
        })
        .await?;

    let path = session
        .filesystem()
        .real_path(&session.root())
        .ok_or_else(|| SyncError::plumbing_unavailable(backend.as_str()))?;

    Ok(TestRepo {
        temp_dir,
        engine,
        session,
        path,
    })
}

/// Sets up a fresh repository on the in-process backend
pub async fn setup_test_repo() -> Result<TestRepo> {
    setup_test_repo_on(BackendKind::Persistent).await
}

/// Sets up a repository with "initial.txt" committed
pub async fn setup_test_repo_with_initial_commit() -> Result<TestRepo> {
    setup_test_repo_with_initial_commit_on(BackendKind::Persistent).await
}

/// Sets up a repository with "initial.txt" committed on the given backend
pub async fn setup_test_repo_with_initial_commit_on(backend: BackendKind) -> Result<TestRepo> {
    let repo = setup_test_repo_on(backend).await?;

    repo.write("initial.txt", "initial content\n")?;
    repo.session.stage_file("initial.txt").await?;
    repo.session.commit("Initial commit", None).await?;

    Ok(repo)
}

/// Creates a file (and its parent directories) in a working tree
pub fn create_file(repo_path: &Path, relative: &str, content: &str) -> Result<()> {
    let target = repo_path.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, content)?;
    Ok(())
}

/// Runs `git` in `dir` with a fixed identity, failing on a non-zero exit
pub fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = std::process::Command::new("git")
        .args(["-c", &format!("user.name={TEST_USER}")])
        .args(["-c", &format!("user.email={TEST_EMAIL}")])
        .args(args)
        .current_dir(dir)
        .output()?;

    if !output.status.success() {
        return Err(SyncError::CommandFailed {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Creates a bare repository to act as a remote
pub fn setup_bare_remote(root: &Path) -> Result<PathBuf> {
    let remote = root.join("remote.git");
    fs::create_dir_all(&remote)?;
    git(&remote, &["init", "--bare", "--initial-branch", TEST_BRANCH])?;
    Ok(remote)
}

/// Clones `remote` into `root/<name>` with the `git` executable
pub fn clone_with_git(remote: &Path, root: &Path, name: &str) -> Result<PathBuf> {
    let target = root.join(name);
    let remote = remote.to_string_lossy().into_owned();
    let target_arg = target.to_string_lossy().into_owned();
    git(root, &["clone", &remote, &target_arg])?;
    Ok(target)
}

/// Writes, commits and pushes one file from a plain git clone
pub fn commit_and_push_with_git(clone: &Path, relative: &str, content: &str, message: &str) -> Result<()> {
    create_file(clone, relative, content)?;
    git(clone, &["add", relative])?;
    git(clone, &["commit", "-m", message])?;
    git(clone, &["push", "origin", TEST_BRANCH])?;
    Ok(())
}
