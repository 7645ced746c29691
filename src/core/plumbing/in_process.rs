//! In-process plumbing backed by `git2`.
//!
//! The repository handle is opened lazily (or created by `init`/`clone_repo`)
//! and guarded by a mutex. Every operation runs on tokio's blocking pool while
//! holding it, so libgit2 never sees concurrent access to one repository and
//! network transfers never stall the async workers.

use super::{
    CloneOptions, CommitRequest, Credentials, MergeOutcome, ObjectCache, Plumbing, Remote,
    RemoteOptions, StashOp, TreeEntry,
};
use crate::core::error::{Result, SyncError};
use crate::core::file_status::StatusRow;
use crate::core::paths::in_scope;
use crate::core::state::{Author, CommitInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, ConfigLevel, Cred, ErrorClass, ErrorCode, FetchOptions, ObjectType, Oid,
    PushOptions, RemoteCallbacks, Repository, RepositoryInitOptions, Signature,
    StashApplyOptions, StatusOptions, Tree, TreeWalkMode, TreeWalkResult,
};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct Git2Plumbing {
    shared: Arc<Shared>,
}

/// Everything an operation needs on the blocking pool.
struct Shared {
    workdir: PathBuf,
    repo: Mutex<Option<Repository>>,
    cache: Arc<ObjectCache>,
    fallback_author: Author,
}

/// Credentials callback that gives up after the first rejected attempt.
fn credential_callbacks<'a>(credentials: Option<&Credentials>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();

    if let Some(credentials) = credentials.cloned() {
        let mut attempts = 0u8;
        callbacks.credentials(move |_url, _username, _allowed| {
            attempts += 1;
            if attempts > 1 {
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Http,
                    "authentication failed",
                ));
            }
            Cred::userpass_plaintext(&credentials.username, &credentials.password)
        });
    }

    callbacks
}

fn timestamp(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or_default()
}

fn is_missing(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

impl Git2Plumbing {
    pub fn new(workdir: impl Into<PathBuf>, cache: Arc<ObjectCache>, fallback_author: Author) -> Self {
        Self {
            shared: Arc::new(Shared {
                workdir: workdir.into(),
                repo: Mutex::new(None),
                cache,
                fallback_author,
            }),
        }
    }

    /// Run `op` against the repository on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Shared, &mut Repository) -> Result<T> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || shared.with_repo(|repo| op(&*shared, repo))).await?
    }

    /// Create a repository on the blocking pool and keep its handle.
    async fn install<F>(&self, create: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<Repository> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || {
            let repo = create(&shared.workdir)?;
            shared.store(repo)
        })
        .await?
    }
}

impl Shared {
    fn with_repo<T>(&self, op: impl FnOnce(&mut Repository) -> Result<T>) -> Result<T> {
        let mut guard = self
            .repo
            .lock()
            .map_err(|_| SyncError::lock_poisoned("repository handle"))?;

        if guard.is_none() {
            log::debug!("Opening repository at {}", self.workdir.display());
            *guard = Some(Repository::open(&self.workdir)?);
        }

        match guard.as_mut() {
            Some(repo) => op(repo),
            None => Err(SyncError::not_found(self.workdir.display().to_string())),
        }
    }

    fn store(&self, repo: Repository) -> Result<()> {
        let mut guard = self
            .repo
            .lock()
            .map_err(|_| SyncError::lock_poisoned("repository handle"))?;
        *guard = Some(repo);
        Ok(())
    }

    /// Identity from the repository config, falling back to the engine's.
    fn signature(&self, repo: &Repository) -> Result<Signature<'static>> {
        match repo.signature() {
            Ok(signature) => Ok(signature),
            Err(_) => Ok(Signature::now(
                &self.fallback_author.name,
                &self.fallback_author.email,
            )?),
        }
    }

    fn flatten(&self, tree: &Tree<'_>) -> Result<Arc<Vec<TreeEntry>>> {
        let key = tree.id().to_string();
        if let Some(hit) = self.cache.tree(&key) {
            return Ok(hit);
        }

        let mut entries = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    entries.push(TreeEntry {
                        path: format!("{root}{name}"),
                        oid: entry.id().to_string(),
                        mode: entry.filemode() as u32,
                    });
                }
            }
            TreeWalkResult::Ok
        })?;

        log::debug!("Decoded tree {key} ({} blobs)", entries.len());
        Ok(self.cache.insert_tree(key, entries))
    }

    fn head_tree(&self, repo: &Repository) -> Result<Option<Arc<Vec<TreeEntry>>>> {
        let head = match repo.head() {
            Ok(head) => head,
            Err(err) if is_missing(&err) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let tree = head.peel_to_tree()?;
        Ok(Some(self.flatten(&tree)?))
    }

    fn tree_of(&self, repo: &Repository, rev: &str) -> Result<Arc<Vec<TreeEntry>>> {
        let tree = repo.revparse_single(rev)?.peel_to_tree()?;
        self.flatten(&tree)
    }

    fn hash_workdir_file(workdir: &Path, path: &str) -> Result<Option<String>> {
        let full = workdir.join(path);
        match std::fs::symlink_metadata(&full) {
            Ok(meta) if meta.is_file() => {
                Ok(Some(Oid::hash_file(ObjectType::Blob, &full)?.to_string()))
            }
            Ok(_) => Ok(None),
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn matrix(&self, repo: &Repository, scope: Option<&[String]>) -> Result<Vec<StatusRow>> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| SyncError::not_found("working directory"))?
            .to_path_buf();

        let head_tree = self.head_tree(repo)?;
        let head: HashMap<&str, &str> = head_tree
            .iter()
            .flat_map(|entries| entries.iter())
            .filter(|entry| in_scope(&entry.path, scope))
            .map(|entry| (entry.path.as_str(), entry.oid.as_str()))
            .collect();

        // Conflicted paths carry no stage-0 entry; prefer "ours" (stage 2) then any.
        let mut index = repo.index()?;
        index.read(false)?;
        let mut staged: HashMap<String, (u8, String)> = HashMap::new();
        for entry in index.iter() {
            let path = String::from_utf8(entry.path).map_err(|_| SyncError::InvalidUtf8Path)?;
            if !in_scope(&path, scope) {
                continue;
            }
            let rank = match (entry.flags >> 12) & 0x3 {
                0 => 0,
                2 => 1,
                _ => 2,
            };
            match staged.get(&path) {
                Some((existing, _)) if *existing <= rank => {}
                _ => {
                    staged.insert(path, (rank, entry.id.to_string()));
                }
            }
        }

        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .include_unmodified(false);
        if let Some(scope) = scope {
            for path in scope.iter().filter(|path| !path.is_empty() && *path != ".") {
                options.pathspec(path.as_str());
            }
        }

        let mut untracked = Vec::new();
        for entry in repo.statuses(Some(&mut options))?.iter() {
            if entry.status().contains(git2::Status::WT_NEW) {
                let path = entry.path().ok_or(SyncError::InvalidUtf8Path)?;
                if in_scope(path, scope) {
                    untracked.push(path.to_string());
                }
            }
        }

        let candidates: BTreeSet<String> = head
            .keys()
            .map(|path| path.to_string())
            .chain(staged.keys().cloned())
            .chain(untracked)
            .collect();

        let mut rows = Vec::with_capacity(candidates.len());
        for path in candidates {
            let workdir_oid = Self::hash_workdir_file(&workdir, &path)?;
            let row = StatusRow::from_oids(
                path.as_str(),
                head.get(path.as_str()).copied(),
                workdir_oid.as_deref(),
                staged.get(&path).map(|(_, oid)| oid.as_str()),
            );
            rows.push(row);
        }

        Ok(rows)
    }

    fn merge_sync(
        &self,
        repo: &Repository,
        ours: &str,
        theirs: &str,
        abort_on_conflict: bool,
        author: &Author,
    ) -> Result<MergeOutcome> {
        let refname = format!("refs/heads/{ours}");
        let their_commit = repo.revparse_single(theirs)?.peel_to_commit()?;
        let annotated = repo.find_annotated_commit(their_commit.id())?;
        let (analysis, _) = repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            log::debug!("{ours} is up to date with {theirs}");
            return Ok(MergeOutcome::UpToDate);
        }

        if analysis.is_fast_forward() || analysis.is_unborn() {
            repo.reference(&refname, their_commit.id(), true, "fast-forward")?;
            repo.set_head(&refname)?;
            repo.checkout_head(Some(CheckoutBuilder::new().safe()))?;
            log::info!("Fast-forwarded {ours} to {}", their_commit.id());
            return Ok(MergeOutcome::FastForward {
                oid: their_commit.id().to_string(),
            });
        }

        let our_commit = repo.find_reference(&refname)?.peel_to_commit()?;
        let mut preview = repo.merge_commits(&our_commit, &their_commit, None)?;

        if preview.has_conflicts() {
            let mut paths = Vec::new();
            for conflict in preview.conflicts()? {
                let conflict = conflict?;
                let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
                if let Some(entry) = entry {
                    paths.push(String::from_utf8_lossy(&entry.path).into_owned());
                }
            }
            let message = format!("Merge conflict in {}", paths.join(", "));

            if !abort_on_conflict {
                let mut checkout = CheckoutBuilder::new();
                checkout.safe().allow_conflicts(true).conflict_style_merge(true);
                repo.merge(&[&annotated], None, Some(&mut checkout))?;
                log::warn!("Merge of {theirs} into {ours} left conflicts: {paths:?}");
            }

            return Err(SyncError::merge_conflict(message));
        }

        let tree_oid = preview.write_tree_to(repo)?;
        let tree = repo.find_tree(tree_oid)?;
        let signature = Signature::now(&author.name, &author.email)?;
        let message = format!("Merge {theirs} into {ours}");
        let oid = repo.commit(
            Some(&refname),
            &signature,
            &signature,
            &message,
            &tree,
            &[&our_commit, &their_commit],
        )?;
        repo.checkout_head(Some(CheckoutBuilder::new().safe()))?;

        log::info!("Merged {theirs} into {ours} as {oid}");
        Ok(MergeOutcome::Merged {
            oid: oid.to_string(),
        })
    }
}

#[async_trait]
impl Plumbing for Git2Plumbing {
    fn name(&self) -> &'static str {
        "git2"
    }

    fn supports_batch_add(&self) -> bool {
        true
    }

    async fn init(&self, default_branch: &str) -> Result<()> {
        let default_branch = default_branch.to_string();
        self.install(move |workdir| {
            let mut options = RepositoryInitOptions::new();
            options.initial_head(&default_branch);

            let repo = Repository::init_opts(workdir, &options)?;
            log::info!(
                "Initialized repository at {} on {default_branch}",
                workdir.display()
            );
            Ok(repo)
        })
        .await
    }

    async fn clone_repo(&self, options: &CloneOptions) -> Result<()> {
        let options = options.clone();
        self.install(move |workdir| {
            let mut fetch_options = FetchOptions::new();
            fetch_options.remote_callbacks(credential_callbacks(options.credentials.as_ref()));
            if let Some(depth) = options.depth {
                fetch_options.depth(depth as i32);
            }

            let mut builder = RepoBuilder::new();
            builder.fetch_options(fetch_options);
            if let Some(branch) = &options.branch {
                builder.branch(branch);
            }

            let repo = builder.clone(&options.url, workdir)?;
            log::info!("Cloned {} into {}", options.url, workdir.display());
            Ok(repo)
        })
        .await
    }

    async fn status_matrix(&self, scope: Option<&[String]>) -> Result<Vec<StatusRow>> {
        let scope = scope.map(<[String]>::to_vec);
        self.run(move |shared, repo| shared.matrix(repo, scope.as_deref()))
            .await
    }

    async fn add(&self, paths: &[String]) -> Result<()> {
        let paths = paths.to_vec();
        self.run(move |_, repo| {
            let mut index = repo.index()?;
            index.read(false)?;
            for path in &paths {
                index.add_path(Path::new(path))?;
            }
            index.write()?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.run(move |_, repo| {
            let mut index = repo.index()?;
            index.read(false)?;
            index.remove_path(Path::new(&path))?;
            index.write()?;
            Ok(())
        })
        .await
    }

    async fn reset_index(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.run(move |shared, repo| {
            let in_head = shared
                .head_tree(repo)?
                .is_some_and(|entries| entries.iter().any(|entry| entry.path == path));

            if in_head {
                let head = repo.head()?.peel_to_commit()?;
                repo.reset_default(Some(head.as_object()), [path.as_str()])?;
            } else {
                let mut index = repo.index()?;
                index.read(false)?;
                index.remove_path(Path::new(&path))?;
                index.write()?;
            }
            Ok(())
        })
        .await
    }

    async fn commit(&self, request: &CommitRequest) -> Result<String> {
        let request = request.clone();
        self.run(move |_, repo| {
            let mut index = repo.index()?;
            index.read(false)?;
            let tree = repo.find_tree(index.write_tree()?)?;
            let signature = Signature::now(&request.author.name, &request.author.email)?;

            let parents = match &request.parents {
                Some(revs) => revs
                    .iter()
                    .map(|rev| repo.revparse_single(rev)?.peel_to_commit())
                    .collect::<std::result::Result<Vec<_>, git2::Error>>()?,
                None => match repo.head() {
                    Ok(head) => vec![head.peel_to_commit()?],
                    Err(err) if is_missing(&err) => Vec::new(),
                    Err(err) => return Err(err.into()),
                },
            };
            let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

            let oid = repo.commit(
                Some("HEAD"),
                &signature,
                &signature,
                &request.message,
                &tree,
                &parent_refs,
            )?;
            if parents.len() > 1 {
                repo.cleanup_state()?;
            }

            log::info!("Created commit {oid}");
            Ok(oid.to_string())
        })
        .await
    }

    async fn log(&self, rev: Option<&str>, depth: Option<usize>) -> Result<Vec<CommitInfo>> {
        let rev = rev.map(str::to_string);
        self.run(move |_, repo| {
            let mut walk = repo.revwalk()?;
            match &rev {
                Some(rev) => walk.push(repo.revparse_single(rev)?.peel_to_commit()?.id())?,
                None => {
                    if walk.push_head().is_err() {
                        return Ok(Vec::new());
                    }
                }
            }
            walk.set_sorting(git2::Sort::TIME)?;

            let mut commits = Vec::new();
            for oid in walk.take(depth.unwrap_or(usize::MAX)) {
                let commit = repo.find_commit(oid?)?;
                let author = commit.author();
                commits.push(CommitInfo {
                    oid: commit.id().to_string(),
                    message: commit.message().unwrap_or_default().to_string(),
                    author: Author::new(
                        author.name().unwrap_or_default(),
                        author.email().unwrap_or_default(),
                    ),
                    timestamp: timestamp(commit.time().seconds()),
                    parents: commit.parent_ids().map(|id| id.to_string()).collect(),
                });
            }
            Ok(commits)
        })
        .await
    }

    async fn list_branches(&self) -> Result<Vec<String>> {
        self.run(|_, repo| {
            let mut names = Vec::new();
            for branch in repo.branches(Some(BranchType::Local))? {
                let (branch, _) = branch?;
                if let Some(name) = branch.name()? {
                    names.push(name.to_string());
                }
            }
            names.sort();
            Ok(names)
        })
        .await
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        self.run(|_, repo| match repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
            Ok(_) => Ok(None),
            Err(err) if is_missing(&err) => {
                let head = repo.find_reference("HEAD")?;
                Ok(head
                    .symbolic_target()
                    .and_then(|target| target.strip_prefix("refs/heads/"))
                    .map(str::to_string))
            }
            Err(err) => Err(err.into()),
        })
        .await
    }

    async fn checkout(&self, rev: &str, force: bool) -> Result<()> {
        let rev = rev.to_string();
        self.run(move |_, repo| {
            let mut builder = CheckoutBuilder::new();
            if force {
                builder.force();
            } else {
                builder.safe();
            }

            match repo.find_branch(&rev, BranchType::Local) {
                Ok(branch) => {
                    let refname = branch
                        .get()
                        .name()
                        .ok_or(SyncError::InvalidUtf8Path)?
                        .to_string();
                    let target = branch.get().peel(ObjectType::Commit)?;
                    repo.checkout_tree(&target, Some(&mut builder))?;
                    repo.set_head(&refname)?;
                }
                Err(_) => {
                    let commit = repo.revparse_single(&rev)?.peel_to_commit()?;
                    repo.checkout_tree(commit.as_object(), Some(&mut builder))?;
                    repo.set_head_detached(commit.id())?;
                }
            }

            log::info!("Checked out {rev}");
            Ok(())
        })
        .await
    }

    async fn write_ref(&self, name: &str, target: &str, force: bool) -> Result<()> {
        let (name, target) = (name.to_string(), target.to_string());
        self.run(move |_, repo| {
            let oid = repo.revparse_single(&target)?.peel_to_commit()?.id();
            repo.reference(&name, oid, force, "write ref")?;
            Ok(())
        })
        .await
    }

    async fn resolve_ref(&self, name: &str) -> Result<String> {
        let name = name.to_string();
        self.run(move |_, repo| Ok(repo.revparse_single(&name)?.peel_to_commit()?.id().to_string()))
            .await
    }

    async fn read_tree(&self, rev: &str) -> Result<Arc<Vec<TreeEntry>>> {
        let rev = rev.to_string();
        self.run(move |shared, repo| shared.tree_of(repo, &rev)).await
    }

    async fn read_blob(&self, rev: &str, path: &str) -> Result<Arc<Vec<u8>>> {
        let (rev, path) = (rev.to_string(), path.to_string());
        self.run(move |shared, repo| {
            let entries = shared.tree_of(repo, &rev)?;
            let entry = entries
                .iter()
                .find(|entry| entry.path == path)
                .ok_or_else(|| SyncError::not_found(format!("{path} at {rev}")))?;

            if let Some(hit) = shared.cache.blob(&entry.oid) {
                return Ok(hit);
            }
            let blob = repo.find_blob(Oid::from_str(&entry.oid)?)?;
            Ok(shared.cache.insert_blob(entry.oid.clone(), blob.content().to_vec()))
        })
        .await
    }

    async fn list_remotes(&self) -> Result<Vec<Remote>> {
        self.run(|_, repo| {
            let names = repo.remotes()?;
            let mut remotes = Vec::new();
            for name in names.iter().flatten() {
                let remote = repo.find_remote(name)?;
                remotes.push(Remote {
                    name: name.to_string(),
                    url: remote.url().unwrap_or_default().to_string(),
                });
            }
            Ok(remotes)
        })
        .await
    }

    async fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        let (name, url) = (name.to_string(), url.to_string());
        self.run(move |_, repo| {
            repo.remote(&name, &url)?;
            Ok(())
        })
        .await
    }

    async fn push(&self, remote: &RemoteOptions, force: bool) -> Result<()> {
        let remote = remote.clone();
        self.run(move |_, repo| {
            let mut target = repo.find_remote(&remote.remote)?;
            let refspec = format!(
                "{}refs/heads/{branch}:refs/heads/{branch}",
                if force { "+" } else { "" },
                branch = remote.branch
            );

            let mut rejection: Option<String> = None;
            {
                let mut callbacks = credential_callbacks(remote.credentials.as_ref());
                callbacks.push_update_reference(|_refname, status| {
                    if let Some(status) = status {
                        rejection = Some(status.to_string());
                    }
                    Ok(())
                });
                let mut options = PushOptions::new();
                options.remote_callbacks(callbacks);
                target.push(&[refspec.as_str()], Some(&mut options))?;
            }

            match rejection {
                Some(reason) => {
                    log::warn!("Push of {} rejected: {reason}", remote.branch);
                    let lowered = reason.to_lowercase();
                    if lowered.contains("fast-forward") || lowered.contains("fetch first") {
                        Err(SyncError::NotFastForward)
                    } else {
                        Err(SyncError::CommandFailed {
                            command: "push".to_string(),
                            stderr: reason,
                        })
                    }
                }
                None => {
                    log::info!("Pushed {} to {}", remote.branch, remote.remote);
                    Ok(())
                }
            }
        })
        .await
    }

    async fn fetch(&self, remote: &RemoteOptions) -> Result<()> {
        let remote = remote.clone();
        self.run(move |_, repo| {
            let mut source = repo.find_remote(&remote.remote)?;
            let refspec = format!("+refs/heads/{}:{}", remote.branch, remote.tracking_ref());

            let mut options = FetchOptions::new();
            options.remote_callbacks(credential_callbacks(remote.credentials.as_ref()));
            source.fetch(&[refspec.as_str()], Some(&mut options), None)?;

            log::debug!("Fetched {} from {}", remote.branch, remote.remote);
            Ok(())
        })
        .await
    }

    async fn merge(
        &self,
        ours: &str,
        theirs: &str,
        abort_on_conflict: bool,
        author: &Author,
    ) -> Result<MergeOutcome> {
        let (ours, theirs, author) = (ours.to_string(), theirs.to_string(), author.clone());
        self.run(move |shared, repo| shared.merge_sync(repo, &ours, &theirs, abort_on_conflict, &author))
            .await
    }

    async fn stash(&self, op: StashOp) -> Result<Vec<String>> {
        self.run(move |shared, repo| {
            match op {
                StashOp::Push { message } => {
                    let signature = shared.signature(repo)?;
                    let oid = repo.stash_save(&signature, &message, None)?;
                    log::info!("Stashed changes as {oid}");
                }
                StashOp::Pop => {
                    let mut options = StashApplyOptions::new();
                    options.reinstantiate_index();
                    repo.stash_pop(0, Some(&mut options))?;
                    log::info!("Popped stash");
                }
                StashOp::Drop => {
                    repo.stash_drop(0)?;
                    log::info!("Dropped stash");
                }
                StashOp::List => {}
            }

            let mut stashes = Vec::new();
            repo.stash_foreach(|_, message, _| {
                stashes.push(message.to_string());
                true
            })?;
            Ok(stashes)
        })
        .await
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.run(move |_, repo| {
            repo.config()?
                .open_level(ConfigLevel::Local)?
                .set_str(&key, &value)?;
            Ok(())
        })
        .await
    }

    async fn get_config(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.run(move |_, repo| match repo.config()?.get_string(&key) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        })
        .await
    }
}
