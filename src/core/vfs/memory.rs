//! In-memory filesystem implementation.
//!
//! Backs the transient repository kind and the path-synchronization tests.
//! All data is lost when dropped.

use super::traits::{DirEntry, EntryKind, Filesystem, Metadata};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, modified: SystemTime },
    Directory { modified: SystemTime },
}

impl Entry {
    fn directory() -> Self {
        Entry::Directory {
            modified: SystemTime::now(),
        }
    }

    fn kind(&self) -> EntryKind {
        match self {
            Entry::File { .. } => EntryKind::File,
            Entry::Directory { .. } => EntryKind::Directory,
        }
    }
}

/// In-memory filesystem.
///
/// Thread-safe via internal `RwLock`. Keys are normalized relative paths; the
/// root is the empty path and always exists.
#[derive(Debug)]
pub struct MemoryFs {
    entries: RwLock<HashMap<PathBuf, Entry>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("not found: {}", path.display()),
    )
}

impl MemoryFs {
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(PathBuf::new(), Entry::directory());
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Normalize a path: drop the leading `/`, resolve `.` and `..`.
    fn normalize(path: &Path) -> PathBuf {
        let mut result = PathBuf::new();
        for component in path.components() {
            match component {
                Component::ParentDir => {
                    result.pop();
                }
                Component::Normal(segment) => result.push(segment),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        result
    }

    fn ensure_parents(entries: &mut HashMap<PathBuf, Entry>, path: &Path) -> io::Result<()> {
        let mut current = PathBuf::new();
        for component in path.parent().into_iter().flat_map(|parent| parent.components()) {
            if let Component::Normal(segment) = component {
                current.push(segment);
                match entries.get(&current) {
                    Some(Entry::Directory { .. }) => {}
                    Some(Entry::File { .. }) => {
                        return Err(io::Error::new(
                            io::ErrorKind::NotADirectory,
                            format!("not a directory: {}", current.display()),
                        ))
                    }
                    None => {
                        entries.insert(current.clone(), Entry::directory());
                    }
                }
            }
        }
        Ok(())
    }

    fn parent_is_dir(entries: &HashMap<PathBuf, Entry>, path: &Path) -> bool {
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        matches!(entries.get(&parent), Some(Entry::Directory { .. }))
    }

    fn has_children(entries: &HashMap<PathBuf, Entry>, dir: &Path) -> bool {
        entries
            .keys()
            .any(|key| key.parent() == Some(dir) && key.as_path() != dir)
    }
}

#[async_trait]
impl Filesystem for MemoryFs {
    async fn stat(&self, path: &Path) -> io::Result<Metadata> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read().await;

        match entries.get(&normalized) {
            Some(Entry::File { data, modified }) => Ok(Metadata {
                kind: EntryKind::File,
                size: data.len() as u64,
                modified: Some(*modified),
            }),
            Some(Entry::Directory { modified }) => Ok(Metadata {
                kind: EntryKind::Directory,
                size: 0,
                modified: Some(*modified),
            }),
            None => Err(not_found(path)),
        }
    }

    async fn readdir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read().await;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {}", path.display()),
                ))
            }
            None => return Err(not_found(path)),
        }

        let mut listing: Vec<DirEntry> = entries
            .iter()
            .filter(|(key, _)| key.parent() == Some(normalized.as_path()) && **key != normalized)
            .filter_map(|(key, entry)| {
                key.file_name().map(|name| DirEntry {
                    name: name.to_string_lossy().into_owned(),
                    kind: entry.kind(),
                })
            })
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(listing)
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read().await;

        match entries.get(&normalized) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write().await;

        if !Self::parent_is_dir(&entries, &normalized) {
            return Err(not_found(path));
        }
        if let Some(Entry::Directory { .. }) = entries.get(&normalized) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            ));
        }

        entries.insert(
            normalized,
            Entry::File {
                data: data.to_vec(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> io::Result<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write().await;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => return Ok(()),
            Some(Entry::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("file exists: {}", path.display()),
                ))
            }
            None => {}
        }

        if recursive {
            Self::ensure_parents(&mut entries, &normalized)?;
        } else if !Self::parent_is_dir(&entries, &normalized) {
            return Err(not_found(path));
        }

        entries.insert(normalized, Entry::directory());
        Ok(())
    }

    async fn unlink(&self, path: &Path) -> io::Result<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write().await;

        match entries.get(&normalized) {
            Some(Entry::File { .. }) => {
                entries.remove(&normalized);
                Ok(())
            }
            Some(Entry::Directory { .. }) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    async fn rmdir(&self, path: &Path) -> io::Result<()> {
        let normalized = Self::normalize(path);

        if normalized.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot remove root directory",
            ));
        }

        let mut entries = self.entries.write().await;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {
                if Self::has_children(&entries, &normalized) {
                    return Err(io::Error::new(
                        io::ErrorKind::DirectoryNotEmpty,
                        format!("directory not empty: {}", path.display()),
                    ));
                }
                entries.remove(&normalized);
                Ok(())
            }
            Some(Entry::File { .. }) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let from_normalized = Self::normalize(from);
        let to_normalized = Self::normalize(to);

        if from_normalized.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot rename root directory",
            ));
        }
        if from_normalized == to_normalized {
            return self.stat(from).await.map(|_| ());
        }

        let mut entries = self.entries.write().await;

        let entry = entries
            .get(&from_normalized)
            .cloned()
            .ok_or_else(|| not_found(from))?;

        if matches!(entry, Entry::Directory { .. }) && to_normalized.starts_with(&from_normalized)
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "cannot move {} into itself ({})",
                    from.display(),
                    to.display()
                ),
            ));
        }

        match (&entry, entries.get(&to_normalized)) {
            (Entry::File { .. }, Some(Entry::Directory { .. })) => {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    format!("destination is a directory: {}", to.display()),
                ))
            }
            (Entry::Directory { .. }, Some(Entry::File { .. })) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("destination is not a directory: {}", to.display()),
                ))
            }
            (Entry::Directory { .. }, Some(Entry::Directory { .. }))
                if Self::has_children(&entries, &to_normalized) =>
            {
                return Err(io::Error::new(
                    io::ErrorKind::DirectoryNotEmpty,
                    format!("destination not empty: {}", to.display()),
                ))
            }
            _ => {}
        }

        Self::ensure_parents(&mut entries, &to_normalized)?;
        entries.remove(&from_normalized);

        if matches!(entry, Entry::Directory { .. }) {
            let children: Vec<(PathBuf, Entry)> = entries
                .iter()
                .filter(|(key, _)| key.starts_with(&from_normalized))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();

            for (old_path, child) in children {
                entries.remove(&old_path);
                if let Ok(relative) = old_path.strip_prefix(&from_normalized) {
                    entries.insert(to_normalized.join(relative), child);
                }
            }
        }

        entries.insert(to_normalized, entry);
        Ok(())
    }
}
