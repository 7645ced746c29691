//! Repository operations, added to [`RepoSession`](crate::core::RepoSession)
//! one concern per module.

pub mod branches;
pub mod course;
pub mod merge;
pub mod stage;
pub mod stash;
pub mod status;
pub mod sync;

pub use branches::{FileDiff, GitConfig};
pub use course::NewCourse;
pub use merge::MergeState;
pub use status::{has_conflict_markers, modified_files_from_rows, sort_files};
pub use sync::{PathSynchronizer, SyncOutcome};
