use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Result of [`Filesystem::stat`].
#[derive(Debug, Clone)]
pub struct Metadata {
    pub kind: EntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// One entry of [`Filesystem::readdir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name of the entry (not full path).
    pub name: String,
    pub kind: EntryKind,
}

/// Abstract filesystem interface.
///
/// Paths are absolute within the backend (`/persistent/course/a.md`).
/// Implementations must report a missing path as `io::ErrorKind::NotFound`.
#[async_trait]
pub trait Filesystem: Send + Sync {
    async fn stat(&self, path: &Path) -> io::Result<Metadata>;

    async fn readdir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write a file, replacing any previous content. The parent directory must exist.
    async fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Create a directory. Succeeds when the directory already exists.
    async fn mkdir(&self, path: &Path, recursive: bool) -> io::Result<()>;

    async fn unlink(&self, path: &Path) -> io::Result<()>;

    /// Remove an empty directory.
    async fn rmdir(&self, path: &Path) -> io::Result<()>;

    /// Move a file or directory, creating the destination's parents.
    ///
    /// Fails with `NotFound` when the source does not exist.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// The on-disk location of `path`, or `None` for virtual backends.
    ///
    /// Git plumbing needs real paths to operate on.
    fn real_path(&self, path: &Path) -> Option<PathBuf> {
        let _ = path;
        None
    }

    /// Whether `path` exists. Only `NotFound` is treated as "absent".
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read_file(path).await?;
        String::from_utf8(bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    /// Write a file, creating missing parent directories first.
    async fn write_file_all(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            self.mkdir(parent, true).await?;
        }
        self.write_file(path, data).await
    }

    /// Remove a directory and everything beneath it, bottom-up.
    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        for entry in self.readdir(path).await? {
            let child = path.join(&entry.name);
            match entry.kind {
                EntryKind::Directory => self.remove_dir_all(&child).await?,
                EntryKind::File => self.unlink(&child).await?,
            }
        }
        self.rmdir(path).await
    }
}
