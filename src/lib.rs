//! Course Git Sync - keeps a structured course document, its working tree and
//! the git repository holding them in agreement.
//!
//! An [`Engine`] opens [`RepoSession`]s over one of three filesystem backends.
//! A session reconciles git status into a published [`StatusSnapshot`],
//! stages and unstages files, manages a stash slot, pulls and pushes through a
//! conflict-aware merge state machine, and renames course directories and
//! slide files so they follow their titles.
//!
//! # Public API
//! The main public interface is re-exported from the [`core`] module:
//! - Repository lifecycle ([`Engine`], [`RepoSession`])
//! - Status model ([`FileStatus`], [`StatusSnapshot`])
//! - Filesystem and git plumbing abstractions
//! - Course document model
//! - Error handling and result types
//!
//! Operations on a session live in the [`commands`] modules.

pub mod commands;
pub mod core;

// Re-export the core public API for external users
pub use core::{
    Author,
    BackendKind,
    CloneRequest,
    Course,
    CourseDocument,
    DeltaLog,
    // Repository lifecycle
    Engine,
    EngineConfig,
    FileStatus,
    Filesystem,
    ModifiedFile,
    Plumbing,
    RepoAccessObject,
    RepoSession,
    Result,
    StatusSnapshot,
    // Error handling
    SyncError,
};

pub use commands::{MergeState, NewCourse, SyncOutcome};

/// Configure `env_logger` for the process: `debug` or `info` unless
/// `RUST_LOG` says otherwise. Safe to call more than once.
pub fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).try_init();
}
