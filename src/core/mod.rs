//! Core building blocks of the synchronization engine.
//!
//! This module provides the filesystem and git abstractions, the status
//! model, error handling, configuration and the per-repository session that
//! the command modules extend.

pub mod config;
pub mod course;
pub mod dirs;
pub mod engine;
pub mod error;
pub mod file_status;
pub mod paths;
pub mod plumbing;
pub mod session;
pub mod state;
pub mod vfs;

// === Error handling ===
// Error taxonomy and result type used throughout the crate
pub use error::{Result, SyncError};

// === Configuration ===
pub use config::EngineConfig;

// === Repository lifecycle ===
// Backend wiring and session creation
pub use engine::{CloneRequest, Engine};
pub use session::{FlightToken, RepoSession, SingleFlight};

// === Status model ===
// Tri-state status matrix and the file status derived from it
pub use file_status::{FileStatus, HeadState, StageState, StatusRow, WorkdirState};
pub use state::{Author, BackendKind, CommitInfo, ModifiedFile, RepoAccessObject, StatusSnapshot};

// === Filesystem ===
pub use vfs::{DirEntry, EntryKind, Filesystem, LocalFs, MemoryFs, Metadata};

// === Git plumbing ===
pub use plumbing::{
    CliPlumbing, CloneOptions, CommitRequest, Credentials, Git2Plumbing, MergeOutcome, ObjectCache, Plumbing,
    Remote, RemoteOptions, StashOp, TreeEntry, WalkRow,
};

// === Course model and paths ===
pub use course::{AssignableUnit, Block, ContentOperation, Course, CourseDocument, DeltaLog, Slide};
pub use paths::{create_unique_path, slugify, UniquePath};
