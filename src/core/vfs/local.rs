//! Local filesystem backend.
//!
//! Serves both the durable app-owned storage and the native filesystem: the
//! two differ only in the directory they are rooted at.

use super::traits::{DirEntry, EntryKind, Filesystem, Metadata};
use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Local filesystem backend.
///
/// All operations are relative to `root`: with `root` = `/data/repos`,
/// `read_file("/persistent/course/a.md")` reads
/// `/data/repos/persistent/course/a.md`.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a backend path onto disk, refusing paths that climb above the root.
    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        let mut depth = 0usize;

        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::PermissionDenied,
                            format!("path escapes root: {}", path.display()),
                        ));
                    }
                    resolved.pop();
                    depth -= 1;
                }
                Component::Normal(segment) => {
                    resolved.push(segment);
                    depth += 1;
                }
            }
        }

        Ok(resolved)
    }

    fn kind_of(file_type: std::fs::FileType) -> EntryKind {
        if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

#[async_trait]
impl Filesystem for LocalFs {
    async fn stat(&self, path: &Path) -> io::Result<Metadata> {
        let metadata = fs::metadata(self.resolve(path)?).await?;
        let kind = Self::kind_of(metadata.file_type());

        Ok(Metadata {
            kind,
            size: if kind == EntryKind::Directory {
                0
            } else {
                metadata.len()
            },
            modified: metadata.modified().ok(),
        })
    }

    async fn readdir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut reader = fs::read_dir(self.resolve(path)?).await?;
        let mut listing = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            listing.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: Self::kind_of(file_type),
            });
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(listing)
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path)?).await
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(self.resolve(path)?, data).await
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> io::Result<()> {
        let full = self.resolve(path)?;
        if recursive {
            return fs::create_dir_all(&full).await;
        }

        match fs::create_dir(&full).await {
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                if fs::metadata(&full).await?.is_dir() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
            other => other,
        }
    }

    async fn unlink(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(self.resolve(path)?).await
    }

    async fn rmdir(&self, path: &Path) -> io::Result<()> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot remove root directory",
            ));
        }
        fs::remove_dir(full).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;

        fs::metadata(&source).await?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&source, &target).await
    }

    fn real_path(&self, path: &Path) -> Option<PathBuf> {
        self.resolve(path).ok()
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot remove root directory",
            ));
        }
        fs::remove_dir_all(full).await
    }
}
