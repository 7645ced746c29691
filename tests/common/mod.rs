//! Shared test utilities for course-git-sync
//!
//! Integration tests run against real repositories in temporary
//! directories; the scripted plumbing covers behavior that needs precise
//! control over what git reports.

pub mod assertions;
pub mod fixtures;
pub mod mock;
pub mod repository;

/// Route `log` output through the test harness. Safe to call from every test.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
