//! Plumbing delegated to the native `git` executable.
//!
//! Every operation is one or more `git` invocations in the repository's
//! working directory. Machine-readable output (`-z`, custom `--format`) is
//! parsed; failures are classified from stderr.

use super::{
    CloneOptions, CommitRequest, Credentials, MergeOutcome, ObjectCache, Plumbing, Remote,
    RemoteOptions, StashOp, TreeEntry,
};
use crate::core::error::{classify_git_stderr, Result, SyncError};
use crate::core::file_status::StatusRow;
use crate::core::paths::in_scope;
use crate::core::state::{Author, CommitInfo};
use async_trait::async_trait;
use base64::Engine;
use chrono::DateTime;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::PathBuf;
use std::process::Output;
use std::sync::Arc;
use tokio::process::Command;

const HASH_BATCH: usize = 256;
const FIELD_SEP: char = '\x1f';
const RECORD_SEP: char = '\x1e';
const LOG_FORMAT: &str = "--format=%H%x1f%an%x1f%ae%x1f%ct%x1f%P%x1f%B%x1e";

pub struct CliPlumbing {
    workdir: PathBuf,
    cache: Arc<ObjectCache>,
    fallback_author: Author,
}

fn auth_header(credentials: &Credentials) -> String {
    let token = base64::engine::general_purpose::STANDARD
        .encode(format!("{}:{}", credentials.username, credentials.password));
    format!("http.extraHeader=Authorization: Basic {token}")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Split `-z` output into its records.
fn nul_records(output: &str) -> impl Iterator<Item = &str> {
    output.split('\0').filter(|record| !record.is_empty())
}

/// Parse `ls-tree -r -z` output into blob entries.
fn parse_ls_tree(output: &str) -> Vec<TreeEntry> {
    nul_records(output)
        .filter_map(|record| {
            let (meta, path) = record.split_once('\t')?;
            let mut fields = meta.split_whitespace();
            let mode = u32::from_str_radix(fields.next()?, 8).ok()?;
            if fields.next()? != "blob" {
                return None;
            }
            Some(TreeEntry {
                path: path.to_string(),
                oid: fields.next()?.to_string(),
                mode,
            })
        })
        .collect()
}

/// Parse `ls-files -s -z` output, keeping one entry per path.
///
/// Stage 0 wins; conflicted paths fall back to "ours" (stage 2), then any stage.
fn parse_ls_files_stage(output: &str) -> HashMap<String, String> {
    let mut best: HashMap<String, (u8, String)> = HashMap::new();

    for record in nul_records(output) {
        let Some((meta, path)) = record.split_once('\t') else {
            continue;
        };
        let fields: Vec<&str> = meta.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        let rank = match fields[2] {
            "0" => 0,
            "2" => 1,
            _ => 2,
        };
        match best.get(path) {
            Some((existing, _)) if *existing <= rank => {}
            _ => {
                best.insert(path.to_string(), (rank, fields[1].to_string()));
            }
        }
    }

    best.into_iter().map(|(path, (_, oid))| (path, oid)).collect()
}

fn parse_log(output: &str) -> Vec<CommitInfo> {
    output
        .split(RECORD_SEP)
        .map(|record| record.trim_start_matches('\n'))
        .filter(|record| !record.is_empty())
        .filter_map(|record| {
            let fields: Vec<&str> = record.splitn(6, FIELD_SEP).collect();
            if fields.len() < 6 {
                return None;
            }
            Some(CommitInfo {
                oid: fields[0].to_string(),
                author: Author::new(fields[1], fields[2]),
                timestamp: DateTime::from_timestamp(fields[3].parse().unwrap_or(0), 0)
                    .unwrap_or_default(),
                parents: fields[4].split_whitespace().map(str::to_string).collect(),
                message: fields[5].to_string(),
            })
        })
        .collect()
}

/// `args` restricted to `scope` by literal pathspecs; unchanged for a full walk.
fn with_pathspec(args: &[&str], scope: Option<&[String]>) -> Vec<String> {
    let mut full: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
    let Some(scope) = scope else {
        return full;
    };
    if scope.iter().any(|path| path.is_empty() || path == ".") {
        return full;
    }

    full.push("--".to_string());
    full.extend(
        scope
            .iter()
            .map(|path| format!(":(literal){}", path.trim_end_matches('/'))),
    );
    full
}

fn as_args(args: &[String]) -> Vec<&str> {
    args.iter().map(String::as_str).collect()
}

impl CliPlumbing {
    pub fn new(workdir: impl Into<PathBuf>, cache: Arc<ObjectCache>, fallback_author: Author) -> Self {
        Self {
            workdir: workdir.into(),
            cache,
            fallback_author,
        }
    }

    fn command(&self, credentials: Option<&Credentials>) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);
        if let Some(credentials) = credentials {
            cmd.arg("-c").arg(auth_header(credentials));
        }
        cmd
    }

    fn with_identity(cmd: &mut Command, author: &Author) {
        cmd.env("GIT_AUTHOR_NAME", &author.name)
            .env("GIT_AUTHOR_EMAIL", &author.email)
            .env("GIT_COMMITTER_NAME", &author.name)
            .env("GIT_COMMITTER_EMAIL", &author.email);
    }

    /// Execute a git command, classifying a non-zero exit as an error.
    async fn execute_git_command(&self, mut cmd: Command, label: &str) -> Result<Output> {
        log::debug!("git {label} in {}", self.workdir.display());
        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let message = if stderr.trim().is_empty() {
                stdout.into_owned()
            } else {
                format!("{}\n{}", stderr.trim(), stdout.trim())
            };
            log::debug!("git {label} failed: {}", message.trim());
            return Err(classify_git_stderr(label, &message));
        }

        Ok(output)
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let mut cmd = self.command(None);
        cmd.args(args);
        let output = self.execute_git_command(cmd, args.first().copied().unwrap_or("git")).await?;
        Ok(stdout_of(&output))
    }

    /// Run a quiet query where exit status 1 means "no value".
    async fn git_optional(&self, args: &[&str]) -> Result<Option<String>> {
        let mut cmd = self.command(None);
        cmd.args(args);
        let output = cmd.output().await?;

        match output.status.code() {
            Some(0) => Ok(Some(stdout_of(&output).trim().to_string())),
            Some(1) => Ok(None),
            _ => Err(classify_git_stderr(
                args.first().copied().unwrap_or("git"),
                &String::from_utf8_lossy(&output.stderr),
            )),
        }
    }

    async fn rev_parse(&self, rev: &str) -> Result<Option<String>> {
        self.git_optional(&["rev-parse", "--verify", "-q", rev]).await
    }

    async fn tree_entries(&self, tree_oid: &str) -> Result<Arc<Vec<TreeEntry>>> {
        if let Some(hit) = self.cache.tree(tree_oid) {
            return Ok(hit);
        }

        let output = self.git(&["ls-tree", "-r", "-z", "--full-tree", tree_oid]).await?;
        let entries = parse_ls_tree(&output);
        log::debug!("Decoded tree {tree_oid} ({} blobs)", entries.len());
        Ok(self.cache.insert_tree(tree_oid.to_string(), entries))
    }

    /// Blob ids of the working-tree versions of `paths`; missing or non-regular files map to `None`.
    async fn hash_workdir(&self, paths: &[String]) -> Result<HashMap<String, String>> {
        let mut regular = Vec::new();
        for path in paths {
            match tokio::fs::symlink_metadata(self.workdir.join(path)).await {
                Ok(meta) if meta.is_file() => regular.push(path.clone()),
                Ok(_) => {}
                Err(err)
                    if matches!(err.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let mut hashes = HashMap::with_capacity(regular.len());
        for chunk in regular.chunks(HASH_BATCH) {
            let mut args = vec!["hash-object", "--"];
            args.extend(chunk.iter().map(String::as_str));
            let output = self.git(&args).await?;
            for (path, oid) in chunk.iter().zip(output.lines()) {
                hashes.insert(path.clone(), oid.trim().to_string());
            }
        }

        Ok(hashes)
    }

    async fn clear_merge_state(&self) -> Result<()> {
        for name in ["MERGE_HEAD", "MERGE_MSG", "MERGE_MODE"] {
            match tokio::fs::remove_file(self.workdir.join(".git").join(name)).await {
                Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err.into()),
                _ => {}
            }
        }
        Ok(())
    }

    async fn in_head(&self, path: &str) -> Result<bool> {
        let Some(tree) = self.rev_parse("HEAD^{tree}").await? else {
            return Ok(false);
        };
        Ok(self
            .tree_entries(&tree)
            .await?
            .iter()
            .any(|entry| entry.path == path))
    }
}

#[async_trait]
impl Plumbing for CliPlumbing {
    fn name(&self) -> &'static str {
        "git-cli"
    }

    fn supports_batch_add(&self) -> bool {
        false
    }

    async fn init(&self, default_branch: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.workdir).await?;
        self.git(&["init", "-q"]).await?;
        let head = format!("refs/heads/{default_branch}");
        self.git(&["symbolic-ref", "HEAD", &head]).await?;

        log::info!(
            "Initialized repository at {} on {default_branch}",
            self.workdir.display()
        );
        Ok(())
    }

    async fn clone_repo(&self, options: &CloneOptions) -> Result<()> {
        let parent = self
            .workdir
            .parent()
            .ok_or_else(|| SyncError::invalid_path(self.workdir.display().to_string(), "no parent directory"))?;
        tokio::fs::create_dir_all(parent).await?;

        let mut cmd = Command::new("git");
        cmd.current_dir(parent)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);
        if let Some(credentials) = &options.credentials {
            cmd.arg("-c").arg(auth_header(credentials));
        }
        cmd.args(["clone", "-q"]);
        if let Some(branch) = &options.branch {
            cmd.arg("--branch").arg(branch);
        }
        if let Some(depth) = options.depth {
            cmd.arg("--depth").arg(depth.to_string());
        }
        cmd.arg(&options.url).arg(&self.workdir);

        self.execute_git_command(cmd, "clone").await?;
        log::info!("Cloned {} into {}", options.url, self.workdir.display());
        Ok(())
    }

    async fn status_matrix(&self, scope: Option<&[String]>) -> Result<Vec<StatusRow>> {
        let head_entries = match self.rev_parse("HEAD^{tree}").await? {
            Some(tree) => Some(self.tree_entries(&tree).await?),
            None => None,
        };
        let head: HashMap<&str, &str> = head_entries
            .iter()
            .flat_map(|entries| entries.iter())
            .filter(|entry| in_scope(&entry.path, scope))
            .map(|entry| (entry.path.as_str(), entry.oid.as_str()))
            .collect();

        let staged_args = with_pathspec(&["ls-files", "-s", "-z"], scope);
        let staged: HashMap<String, String> =
            parse_ls_files_stage(&self.git(&as_args(&staged_args)).await?)
                .into_iter()
                .filter(|(path, _)| in_scope(path, scope))
                .collect();

        let untracked_args = with_pathspec(&["ls-files", "-o", "--exclude-standard", "-z"], scope);
        let untracked_output = self.git(&as_args(&untracked_args)).await?;

        let candidates: Vec<String> = head
            .keys()
            .map(|path| path.to_string())
            .chain(staged.keys().cloned())
            .chain(
                nul_records(&untracked_output)
                    .filter(|path| in_scope(path, scope))
                    .map(str::to_string),
            )
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let workdir = self.hash_workdir(&candidates).await?;

        Ok(candidates
            .iter()
            .map(|path| {
                StatusRow::from_oids(
                    path.as_str(),
                    head.get(path.as_str()).copied(),
                    workdir.get(path).map(String::as_str),
                    staged.get(path).map(String::as_str),
                )
            })
            .collect())
    }

    async fn add(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.git(&args).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.git(&["rm", "--cached", "-q", "--ignore-unmatch", "--", path])
            .await?;
        Ok(())
    }

    async fn reset_index(&self, path: &str) -> Result<()> {
        if self.in_head(path).await? {
            self.git(&["reset", "-q", "HEAD", "--", path]).await?;
        } else {
            self.remove(path).await?;
        }
        Ok(())
    }

    async fn commit(&self, request: &CommitRequest) -> Result<String> {
        let oid = match &request.parents {
            None => {
                let mut cmd = self.command(None);
                Self::with_identity(&mut cmd, &request.author);
                cmd.args(["commit", "-q", "--no-verify", "-m", request.message.as_str()]);
                self.execute_git_command(cmd, "commit").await?;
                self.git(&["rev-parse", "HEAD"]).await?.trim().to_string()
            }
            Some(parents) => {
                let tree = self.git(&["write-tree"]).await?.trim().to_string();

                let mut cmd = self.command(None);
                Self::with_identity(&mut cmd, &request.author);
                cmd.args(["commit-tree", tree.as_str()]);
                for parent in parents {
                    cmd.arg("-p").arg(parent);
                }
                cmd.arg("-m").arg(&request.message);
                let output = self.execute_git_command(cmd, "commit-tree").await?;
                let oid = stdout_of(&output).trim().to_string();

                self.git(&["update-ref", "HEAD", &oid]).await?;
                self.clear_merge_state().await?;
                oid
            }
        };

        log::info!("Created commit {oid}");
        Ok(oid)
    }

    async fn log(&self, rev: Option<&str>, depth: Option<usize>) -> Result<Vec<CommitInfo>> {
        let start = rev.unwrap_or("HEAD");
        if rev.is_none() && self.rev_parse("HEAD").await?.is_none() {
            return Ok(Vec::new());
        }

        let limit = depth.map(|depth| format!("-n{depth}"));
        let mut args = vec!["log", LOG_FORMAT];
        if let Some(limit) = &limit {
            args.push(limit.as_str());
        }
        args.push(start);
        args.push("--");

        Ok(parse_log(&self.git(&args).await?))
    }

    async fn list_branches(&self) -> Result<Vec<String>> {
        let output = self
            .git(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])
            .await?;
        let mut names: Vec<String> = output.lines().map(str::to_string).collect();
        names.sort();
        Ok(names)
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        self.git_optional(&["symbolic-ref", "--short", "-q", "HEAD"])
            .await
    }

    async fn checkout(&self, rev: &str, force: bool) -> Result<()> {
        let mut args = vec!["checkout", "-q"];
        if force {
            args.push("-f");
        }
        args.push(rev);
        self.git(&args).await?;
        log::info!("Checked out {rev}");
        Ok(())
    }

    async fn write_ref(&self, name: &str, target: &str, force: bool) -> Result<()> {
        let oid = self.resolve_ref(target).await?;
        if force {
            self.git(&["update-ref", name, &oid]).await?;
        } else {
            self.git(&["update-ref", name, &oid, ""]).await?;
        }
        Ok(())
    }

    async fn resolve_ref(&self, name: &str) -> Result<String> {
        let rev = format!("{name}^{{commit}}");
        self.rev_parse(&rev)
            .await?
            .ok_or_else(|| SyncError::not_found(name))
    }

    async fn read_tree(&self, rev: &str) -> Result<Arc<Vec<TreeEntry>>> {
        let rev = format!("{rev}^{{tree}}");
        let tree = self
            .rev_parse(&rev)
            .await?
            .ok_or_else(|| SyncError::not_found(rev.as_str()))?;
        self.tree_entries(&tree).await
    }

    async fn read_blob(&self, rev: &str, path: &str) -> Result<Arc<Vec<u8>>> {
        let entries = self.read_tree(rev).await?;
        let entry = entries
            .iter()
            .find(|entry| entry.path == path)
            .ok_or_else(|| SyncError::not_found(format!("{path} at {rev}")))?;

        if let Some(hit) = self.cache.blob(&entry.oid) {
            return Ok(hit);
        }

        let mut cmd = self.command(None);
        cmd.args(["cat-file", "blob", entry.oid.as_str()]);
        let output = self.execute_git_command(cmd, "cat-file").await?;
        Ok(self.cache.insert_blob(entry.oid.clone(), output.stdout))
    }

    async fn list_remotes(&self) -> Result<Vec<Remote>> {
        let output = self.git(&["remote", "-v"]).await?;
        Ok(output
            .lines()
            .filter(|line| line.ends_with("(fetch)"))
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                Some(Remote {
                    name: fields.next()?.to_string(),
                    url: fields.next()?.to_string(),
                })
            })
            .collect())
    }

    async fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        self.git(&["remote", "add", name, url]).await?;
        Ok(())
    }

    async fn push(&self, remote: &RemoteOptions, force: bool) -> Result<()> {
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", remote.branch);
        let mut cmd = self.command(remote.credentials.as_ref());
        cmd.args(["push", "-q", "--porcelain"]);
        if force {
            cmd.arg("--force");
        }
        cmd.arg(&remote.remote).arg(&refspec);

        self.execute_git_command(cmd, "push").await?;
        log::info!("Pushed {} to {}", remote.branch, remote.remote);
        Ok(())
    }

    async fn fetch(&self, remote: &RemoteOptions) -> Result<()> {
        let refspec = format!("+refs/heads/{}:{}", remote.branch, remote.tracking_ref());
        let mut cmd = self.command(remote.credentials.as_ref());
        cmd.args(["fetch", "-q"]).arg(&remote.remote).arg(&refspec);

        self.execute_git_command(cmd, "fetch").await?;
        log::debug!("Fetched {} from {}", remote.branch, remote.remote);
        Ok(())
    }

    async fn merge(
        &self,
        ours: &str,
        theirs: &str,
        abort_on_conflict: bool,
        author: &Author,
    ) -> Result<MergeOutcome> {
        if self.current_branch().await?.as_deref() != Some(ours) {
            self.checkout(ours, false).await?;
        }
        let their_oid = self.resolve_ref(theirs).await?;

        let Some(our_oid) = self.rev_parse("HEAD").await? else {
            self.git(&["merge", "-q", "--ff-only", &their_oid]).await?;
            return Ok(MergeOutcome::FastForward { oid: their_oid });
        };

        let ancestor = |a: String, b: String| async move {
            self.git_optional(&["merge-base", "--is-ancestor", &a, &b])
                .await
                .map(|found| found.is_some())
        };

        if ancestor(their_oid.clone(), our_oid.clone()).await? {
            log::debug!("{ours} is up to date with {theirs}");
            return Ok(MergeOutcome::UpToDate);
        }
        if ancestor(our_oid, their_oid.clone()).await? {
            self.git(&["merge", "-q", "--ff-only", &their_oid]).await?;
            log::info!("Fast-forwarded {ours} to {their_oid}");
            return Ok(MergeOutcome::FastForward { oid: their_oid });
        }

        let message = format!("Merge {theirs} into {ours}");
        let mut cmd = self.command(None);
        Self::with_identity(&mut cmd, author);
        cmd.args([
            "merge",
            "--no-ff",
            "--no-edit",
            "-m",
            message.as_str(),
            their_oid.as_str(),
        ]);

        let err = match self.execute_git_command(cmd, "merge").await {
            Ok(_) => {
                let oid = self.git(&["rev-parse", "HEAD"]).await?.trim().to_string();
                log::info!("Merged {theirs} into {ours} as {oid}");
                return Ok(MergeOutcome::Merged { oid });
            }
            Err(err) => err,
        };

        // A merge that stopped half way leaves MERGE_HEAD behind.
        let stopped = self.rev_parse("MERGE_HEAD").await?.is_some();
        if !stopped && !err.is_merge_conflict() {
            return Err(err);
        }

        if abort_on_conflict && stopped {
            self.git(&["merge", "--abort"]).await?;
            log::debug!("Aborted conflicting merge of {theirs} into {ours}");
        } else {
            log::warn!("Merge of {theirs} into {ours} left conflicts");
        }

        Err(match err {
            SyncError::MergeConflict { .. } => err,
            other => SyncError::merge_conflict(other.to_string()),
        })
    }

    async fn stash(&self, op: StashOp) -> Result<Vec<String>> {
        match op {
            StashOp::Push { message } => {
                let mut cmd = self.command(None);
                Self::with_identity(&mut cmd, &self.fallback_author);
                cmd.args(["stash", "push", "-q", "-m", message.as_str()]);
                self.execute_git_command(cmd, "stash").await?;
                log::info!("Stashed changes");
            }
            StashOp::Pop => {
                self.git(&["stash", "pop", "-q", "--index"]).await?;
                log::info!("Popped stash");
            }
            StashOp::Drop => {
                self.git(&["stash", "drop", "-q"]).await?;
                log::info!("Dropped stash");
            }
            StashOp::List => {}
        }

        let output = self.git(&["stash", "list", "--format=%gs"]).await?;
        Ok(output.lines().map(str::to_string).collect())
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.git(&["config", key, value]).await?;
        Ok(())
    }

    async fn get_config(&self, key: &str) -> Result<Option<String>> {
        self.git_optional(&["config", "--get", key]).await
    }
}
