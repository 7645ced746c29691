//! Virtual filesystem adapter.
//!
//! Every component that touches file bytes goes through the [`Filesystem`]
//! trait, so the engine behaves the same over transient memory, durable
//! app-owned storage and the native filesystem.
//!
//! # Public API
//! - [`Filesystem`]: async POSIX-like contract (stat, readdir, read, write, mkdir, unlink, rmdir, rename)
//! - [`MemoryFs`]: transient in-memory backend
//! - [`LocalFs`]: on-disk backend rooted at a directory
//! - [`Metadata`], [`DirEntry`], [`EntryKind`]: stat and listing results
//!
//! Missing paths always surface as `io::ErrorKind::NotFound`; callers that
//! test for existence use [`Filesystem::exists`], which swallows that kind only.

mod local;
mod memory;
mod traits;

pub use local::LocalFs;
pub use memory::MemoryFs;
pub use traits::{DirEntry, EntryKind, Filesystem, Metadata};
