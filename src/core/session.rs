//! Per-repository session state.
//!
//! A [`RepoSession`] bundles everything the commands need for one
//! repository: its filesystem, its plumbing, the decoded-object cache, the
//! published status snapshot and the concurrency guards. The command modules
//! (`commands::status`, `commands::stage`, ...) add their operations to it
//! through further `impl RepoSession` blocks.

use crate::core::config::EngineConfig;
use crate::core::plumbing::{ObjectCache, Plumbing};
use crate::core::state::{RepoAccessObject, StatusSnapshot};
use crate::core::vfs::Filesystem;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// At-most-one-in-flight guard.
#[derive(Debug, Default)]
pub struct SingleFlight {
    in_flight: AtomicBool,
}

/// Held while the guarded work runs; dropping it releases the flight.
#[derive(Debug)]
pub struct FlightToken<'a> {
    flight: &'a SingleFlight,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flight, or `None` when one is already running.
    pub fn try_begin(&self) -> Option<FlightToken<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightToken { flight: self })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for FlightToken<'_> {
    fn drop(&mut self) {
        self.flight.in_flight.store(false, Ordering::Release);
    }
}

/// Refs whose movement invalidates the published history and stash view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HistoryMarks {
    pub head: Option<String>,
    pub stash: Option<String>,
}

pub struct RepoSession {
    pub(crate) repo: RepoAccessObject,
    pub(crate) vfs: Arc<dyn Filesystem>,
    pub(crate) plumbing: Arc<dyn Plumbing>,
    pub(crate) cache: Arc<ObjectCache>,
    pub(crate) config: EngineConfig,
    pub(crate) flight: SingleFlight,
    pub(crate) status_tx: watch::Sender<StatusSnapshot>,
    /// Serializes path synchronization.
    pub(crate) sync_lock: Mutex<()>,
    /// Held while a pull or merge talks to the remote.
    pub(crate) merge_flight: SingleFlight,
    /// Marks the published history was read at, `None` until it was read.
    pub(crate) history_marks: Mutex<Option<HistoryMarks>>,
}

impl RepoSession {
    /// Assemble a session from explicit parts.
    ///
    /// `Engine::open` is the usual entry point; this constructor lets callers
    /// supply their own plumbing.
    pub fn with_parts(
        repo: RepoAccessObject,
        vfs: Arc<dyn Filesystem>,
        plumbing: Arc<dyn Plumbing>,
        cache: Arc<ObjectCache>,
        config: EngineConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(StatusSnapshot::default());
        log::debug!("Opened session for {repo} using {}", plumbing.name());

        Self {
            repo,
            vfs,
            plumbing,
            cache,
            config,
            flight: SingleFlight::new(),
            status_tx,
            sync_lock: Mutex::new(()),
            merge_flight: SingleFlight::new(),
            history_marks: Mutex::new(None),
        }
    }

    pub fn repo(&self) -> &RepoAccessObject {
        &self.repo
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn filesystem(&self) -> &Arc<dyn Filesystem> {
        &self.vfs
    }

    pub fn plumbing(&self) -> &Arc<dyn Plumbing> {
        &self.plumbing
    }

    pub fn object_cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    /// Root of the repository inside its backend's filesystem.
    pub fn root(&self) -> PathBuf {
        self.repo.root_path()
    }

    pub fn path_of(&self, relative: &str) -> PathBuf {
        self.repo.path_of(relative)
    }

    /// Receive every published status snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.status_tx.borrow().clone()
    }

    pub(crate) fn publish(&self, update: impl FnOnce(&mut StatusSnapshot)) {
        self.status_tx.send_modify(update);
    }

    pub fn sentinel_path(&self) -> PathBuf {
        self.path_of(&self.config.conflict_sentinel)
    }

    /// Whether a status resolve is currently running.
    pub fn is_resolving(&self) -> bool {
        self.flight.is_in_flight()
    }

    pub async fn write_file(&self, relative: &str, data: &[u8]) -> std::io::Result<()> {
        self.vfs.write_file_all(&self.path_of(relative), data).await
    }

    pub async fn read_file(&self, relative: &str) -> std::io::Result<Vec<u8>> {
        self.vfs.read_file(&self.path_of(relative)).await
    }

    pub async fn remove_file(&self, relative: &str) -> std::io::Result<()> {
        self.vfs.unlink(&self.path_of(relative)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight_admits_one_holder() {
        let flight = SingleFlight::new();

        let token = flight.try_begin();
        assert!(token.is_some());
        assert!(flight.is_in_flight());
        assert!(flight.try_begin().is_none());

        drop(token);
        assert!(!flight.is_in_flight());
        assert!(flight.try_begin().is_some());
    }
}
