//! Common assertion helpers
//!
//! Predicates for error messages, plus status lookups on published snapshots.

#![allow(dead_code)]

use course_git_sync::{FileStatus, StatusSnapshot};
use predicates::prelude::*;

/// Creates a predicate matching the conflict guidance returned by a failed merge
pub fn merge_conflict_guidance() -> impl Predicate<str> {
    predicates::str::contains("merge conflicts").and(predicates::str::contains("complete the merge"))
}

/// Creates a predicate matching the rejected-push message
pub fn pull_first() -> impl Predicate<str> {
    predicates::str::contains("fast forward").and(predicates::str::contains("please pull"))
}

/// Creates a predicate matching the invalid-credentials message
pub fn auth_failed() -> impl Predicate<str> {
    predicates::str::contains("authentication has failed")
}

/// Status of `name` in the snapshot, if it is part of the modified set
pub fn status_of(snapshot: &StatusSnapshot, name: &str) -> Option<FileStatus> {
    snapshot.file(name).map(|file| file.status)
}

/// Asserts the modified set holds exactly `expected`, in any order
pub fn assert_modified_set(snapshot: &StatusSnapshot, expected: &[(&str, FileStatus)]) {
    let mut actual: Vec<(String, FileStatus)> = snapshot
        .modified_files
        .iter()
        .map(|file| (file.name.clone(), file.status))
        .collect();
    actual.sort_by(|a, b| a.0.cmp(&b.0));

    let mut wanted: Vec<(String, FileStatus)> = expected
        .iter()
        .map(|(name, status)| (name.to_string(), *status))
        .collect();
    wanted.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(actual, wanted);
}
