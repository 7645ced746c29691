//! Type-safe file status derived from the (HEAD, WORKDIR, STAGE) status matrix.
//!
//! Every path in a repository is described by three views: the last commit,
//! the working tree and the index. This module encodes each view as a closed
//! tri-state enum and maps the combination onto a single [`FileStatus`].
//!
//! # Public API
//! - [`HeadState`], [`WorkdirState`], [`StageState`]: one column of the matrix each
//! - [`StatusRow`]: a path together with its three states
//! - [`FileStatus`]: the user-facing status derived from a row
//!
//! # Key Features
//! - **Exhaustive conversion**: [`FileStatus::from_states`] matches every
//!   combination explicitly, so adding a state fails to compile until mapped
//! - **Object-id derivation**: [`StatusRow::from_oids`] computes the states
//!   from blob ids with the "first equal column" rule
//! - **Display formatting**: snake_case names shared with serde
//! - **Sorting logic**: built-in priority ordering for status display

use serde::{Deserialize, Serialize};
use std::fmt;

/// Presence of a path in the HEAD commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeadState {
    Absent,
    Present,
}

/// Working-tree content of a path, relative to HEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkdirState {
    Absent,
    IdenticalToHead,
    DifferentFromHead,
}

/// Index content of a path, relative to HEAD and the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageState {
    Absent,
    IdenticalToHead,
    IdenticalToWorkdir,
    DifferentFromWorkdir,
}

impl HeadState {
    pub const ALL: [HeadState; 2] = [HeadState::Absent, HeadState::Present];

    pub fn code(self) -> u8 {
        match self {
            HeadState::Absent => 0,
            HeadState::Present => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(HeadState::Absent),
            1 => Some(HeadState::Present),
            _ => None,
        }
    }
}

impl WorkdirState {
    pub const ALL: [WorkdirState; 3] = [
        WorkdirState::Absent,
        WorkdirState::IdenticalToHead,
        WorkdirState::DifferentFromHead,
    ];

    pub fn code(self) -> u8 {
        match self {
            WorkdirState::Absent => 0,
            WorkdirState::IdenticalToHead => 1,
            WorkdirState::DifferentFromHead => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(WorkdirState::Absent),
            1 => Some(WorkdirState::IdenticalToHead),
            2 => Some(WorkdirState::DifferentFromHead),
            _ => None,
        }
    }
}

impl StageState {
    pub const ALL: [StageState; 4] = [
        StageState::Absent,
        StageState::IdenticalToHead,
        StageState::IdenticalToWorkdir,
        StageState::DifferentFromWorkdir,
    ];

    pub fn code(self) -> u8 {
        match self {
            StageState::Absent => 0,
            StageState::IdenticalToHead => 1,
            StageState::IdenticalToWorkdir => 2,
            StageState::DifferentFromWorkdir => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(StageState::Absent),
            1 => Some(StageState::IdenticalToHead),
            2 => Some(StageState::IdenticalToWorkdir),
            3 => Some(StageState::DifferentFromWorkdir),
            _ => None,
        }
    }
}

/// One row of the status matrix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusRow {
    pub path: String,
    pub head: HeadState,
    pub workdir: WorkdirState,
    pub stage: StageState,
}

impl StatusRow {
    /// Derive the three states from the blob ids found in each view.
    ///
    /// With `entry = [None, head, workdir, stage]`, each column's state is the
    /// first position in `entry` holding an equal value. An absent view is
    /// `None` and therefore always resolves to position 0.
    pub fn from_oids(
        path: impl Into<String>,
        head: Option<&str>,
        workdir: Option<&str>,
        stage: Option<&str>,
    ) -> Self {
        let entry = [None, head, workdir, stage];
        let position = |value: Option<&str>| -> u8 {
            entry
                .iter()
                .position(|candidate| *candidate == value)
                .unwrap_or(0) as u8
        };

        // Positions are bounded by construction: head can only match 0..=1,
        // workdir 0..=2 and stage 0..=3.
        Self {
            path: path.into(),
            head: HeadState::from_code(position(head)).unwrap_or(HeadState::Absent),
            workdir: WorkdirState::from_code(position(workdir)).unwrap_or(WorkdirState::Absent),
            stage: StageState::from_code(position(stage)).unwrap_or(StageState::Absent),
        }
    }

    pub fn status(&self) -> FileStatus {
        FileStatus::from_states(self.head, self.workdir, self.stage)
    }

    /// The numeric `(HEAD, WORKDIR, STAGE)` triple.
    pub fn codes(&self) -> (u8, u8, u8) {
        (self.head.code(), self.workdir.code(), self.stage.code())
    }
}

/// User-facing status of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Untracked,
    Modified,
    Added,
    AddedWithChanges,
    Unmodified,
    Staged,
    StagedWithChanges,
    DeletedUnstaged,
    DeletedStaged,
    DeletedStagedWithChanges,
    DeletedStagedWithRename,
    AddedThenDeleted,
    Unknown,
}

impl FileStatus {
    pub const ALL: [FileStatus; 13] = [
        FileStatus::Untracked,
        FileStatus::Modified,
        FileStatus::Added,
        FileStatus::AddedWithChanges,
        FileStatus::Unmodified,
        FileStatus::Staged,
        FileStatus::StagedWithChanges,
        FileStatus::DeletedUnstaged,
        FileStatus::DeletedStaged,
        FileStatus::DeletedStagedWithChanges,
        FileStatus::DeletedStagedWithRename,
        FileStatus::AddedThenDeleted,
        FileStatus::Unknown,
    ];

    /// Map a status-matrix combination onto a status.
    ///
    /// Each arm is listed explicitly; combinations that cannot be produced by a
    /// consistent repository map to [`FileStatus::Unknown`].
    pub fn from_states(head: HeadState, workdir: WorkdirState, stage: StageState) -> Self {
        use HeadState as H;
        use StageState as S;
        use WorkdirState as W;

        match (head, workdir, stage) {
            (H::Absent, W::DifferentFromHead, S::Absent) => FileStatus::Untracked,
            (H::Absent, W::DifferentFromHead, S::IdenticalToWorkdir) => FileStatus::Added,
            (H::Absent, W::DifferentFromHead, S::DifferentFromWorkdir) => {
                FileStatus::AddedWithChanges
            }
            (H::Present, W::IdenticalToHead, S::IdenticalToHead) => FileStatus::Unmodified,
            (H::Present, W::DifferentFromHead, S::IdenticalToHead) => FileStatus::Modified,
            (H::Present, W::DifferentFromHead, S::IdenticalToWorkdir) => FileStatus::Staged,
            (H::Present, W::DifferentFromHead, S::DifferentFromWorkdir) => {
                FileStatus::StagedWithChanges
            }
            (H::Present, W::Absent, S::IdenticalToHead) => FileStatus::DeletedUnstaged,
            (H::Present, W::Absent, S::Absent) => FileStatus::DeletedStaged,
            (H::Absent, W::Absent, S::DifferentFromWorkdir) => FileStatus::AddedThenDeleted,
            (H::Present, W::DifferentFromHead, S::Absent) => FileStatus::DeletedStagedWithChanges,
            (H::Present, W::IdenticalToHead, S::Absent) => FileStatus::DeletedStagedWithRename,

            (H::Absent, W::Absent, S::Absent)
            | (H::Absent, W::Absent, S::IdenticalToHead)
            | (H::Absent, W::Absent, S::IdenticalToWorkdir)
            | (H::Absent, W::IdenticalToHead, _)
            | (H::Absent, W::DifferentFromHead, S::IdenticalToHead)
            | (H::Present, W::Absent, S::IdenticalToWorkdir)
            | (H::Present, W::Absent, S::DifferentFromWorkdir)
            | (H::Present, W::IdenticalToHead, S::IdenticalToWorkdir)
            | (H::Present, W::IdenticalToHead, S::DifferentFromWorkdir) => FileStatus::Unknown,
        }
    }

    /// Statuses whose change is fully recorded in the index.
    pub fn is_staged(&self) -> bool {
        matches!(
            self,
            FileStatus::Staged
                | FileStatus::Added
                | FileStatus::DeletedStaged
                | FileStatus::DeletedStagedWithChanges
                | FileStatus::DeletedStagedWithRename
        )
    }

    /// Statuses where the index no longer (or is about to no longer) hold the path.
    pub fn is_deleted(&self) -> bool {
        matches!(
            self,
            FileStatus::DeletedUnstaged
                | FileStatus::DeletedStaged
                | FileStatus::DeletedStagedWithChanges
                | FileStatus::DeletedStagedWithRename
        )
    }

    /// Whether the status belongs in the visible modified-file set.
    pub fn is_visible(&self) -> bool {
        !matches!(self, FileStatus::Unmodified | FileStatus::Unknown)
    }

    /// Whether the file may contain merge conflict markers worth scanning for.
    pub fn may_hold_conflict(&self) -> bool {
        matches!(self, FileStatus::Modified | FileStatus::StagedWithChanges)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Untracked => "untracked",
            FileStatus::Modified => "modified",
            FileStatus::Added => "added",
            FileStatus::AddedWithChanges => "added_with_changes",
            FileStatus::Unmodified => "unmodified",
            FileStatus::Staged => "staged",
            FileStatus::StagedWithChanges => "staged_with_changes",
            FileStatus::DeletedUnstaged => "deleted_unstaged",
            FileStatus::DeletedStaged => "deleted_staged",
            FileStatus::DeletedStagedWithChanges => "deleted_staged_with_changes",
            FileStatus::DeletedStagedWithRename => "deleted_staged_with_rename",
            FileStatus::AddedThenDeleted => "added_then_deleted",
            FileStatus::Unknown => "unknown",
        }
    }

    /// Get sort priority for status ordering
    /// Staged changes first, then unstaged, then untracked
    pub fn sort_priority(&self) -> u8 {
        match self {
            FileStatus::Added => 0,
            FileStatus::Staged => 1,
            FileStatus::DeletedStaged => 2,
            FileStatus::DeletedStagedWithChanges => 3,
            FileStatus::DeletedStagedWithRename => 4,
            FileStatus::AddedWithChanges => 5,
            FileStatus::StagedWithChanges => 6,
            FileStatus::Modified => 7,
            FileStatus::DeletedUnstaged => 8,
            FileStatus::AddedThenDeleted => 9,
            FileStatus::Untracked => 10,
            FileStatus::Unmodified => 11,
            FileStatus::Unknown => 12,
        }
    }

    /// Get human-readable description for status
    pub fn description(&self) -> &'static str {
        match self {
            FileStatus::Untracked => "new file, not staged",
            FileStatus::Modified => "modified, not staged",
            FileStatus::Added => "new file, staged",
            FileStatus::AddedWithChanges => "new file, staged with further changes",
            FileStatus::Unmodified => "unmodified",
            FileStatus::Staged => "modified, staged",
            FileStatus::StagedWithChanges => "modified, staged with further changes",
            FileStatus::DeletedUnstaged => "deleted, not staged",
            FileStatus::DeletedStaged => "deleted, staged",
            FileStatus::DeletedStagedWithChanges => "removed from index, file still changed",
            FileStatus::DeletedStagedWithRename => "removed from index, file unchanged",
            FileStatus::AddedThenDeleted => "staged new file, deleted from disk",
            FileStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
