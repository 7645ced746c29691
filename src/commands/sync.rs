//! Path synchronization between a course document and the working tree.
//!
//! The document is the source of truth for names: every unit directory is
//! renamed to the slug of its name, every slide file to the slug of its
//! title, without ever overwriting a path owned by something else. Pending
//! content changes are applied first, and the stripped document is written
//! back to the course descriptor last.

use crate::core::course::{Course, CourseDocument, ContentOperation, DeltaLog};
use crate::core::error::{Result, SyncError};
use crate::core::paths::{create_unique_path, file_name, join_path, parent_dir, slugify, UniquePath};
use crate::core::session::RepoSession;
use crate::core::vfs::Filesystem;
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;

/// Result of a synchronization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    /// Every repo-relative path created, modified, deleted or renamed (both
    /// sides), de-duplicated in first-seen order.
    pub changed_paths: Vec<String>,
    /// The document with updated directory and file paths.
    pub document: CourseDocument,
}

pub struct PathSynchronizer<'a> {
    fs: &'a dyn Filesystem,
    repo_root: PathBuf,
    descriptor_filename: &'a str,
    max_slug_length: usize,
}

/// Collects changed paths in first-seen order.
#[derive(Default)]
struct ChangeLog {
    seen: HashSet<String>,
    paths: Vec<String>,
}

impl ChangeLog {
    fn record(&mut self, path: &str) {
        if self.seen.insert(path.to_string()) {
            self.paths.push(path.to_string());
        }
    }
}

impl<'a> PathSynchronizer<'a> {
    pub fn new(
        fs: &'a dyn Filesystem,
        repo_root: impl Into<PathBuf>,
        descriptor_filename: &'a str,
        max_slug_length: usize,
    ) -> Self {
        Self {
            fs,
            repo_root: repo_root.into(),
            descriptor_filename,
            max_slug_length,
        }
    }

    fn abs(&self, relative: &str) -> PathBuf {
        self.repo_root.join(relative)
    }

    pub async fn synchronize(&self, course: &Course, deltas: &DeltaLog) -> Result<SyncOutcome> {
        let descriptor = join_path(&course.base_path, self.descriptor_filename);
        if !self.fs.exists(&self.abs(&descriptor)).await? {
            return Err(SyncError::CourseDescriptorMissing { path: descriptor });
        }

        let mut document = course.data.clone();
        let mut changes = ChangeLog::default();

        self.apply_deltas(&document, deltas, &mut changes).await;
        self.align_paths(&mut document, &mut changes).await?;

        let yaml = document.strip_content().to_yaml()?;
        self.fs
            .write_file_all(&self.abs(&descriptor), yaml.as_bytes())
            .await?;
        changes.record(&descriptor);

        log::info!(
            "Synchronized course '{}' ({} changed paths)",
            course.base_path,
            changes.paths.len()
        );

        Ok(SyncOutcome {
            changed_paths: changes.paths,
            document,
        })
    }

    /// Apply pending content changes. Individual failures are logged and skipped.
    async fn apply_deltas(&self, document: &CourseDocument, deltas: &DeltaLog, changes: &mut ChangeLog) {
        for (path, operation) in deltas {
            let target = self.abs(path);

            match operation {
                ContentOperation::Delete => {
                    let metadata = match self.fs.stat(&target).await {
                        Ok(metadata) => metadata,
                        Err(e) => {
                            log::warn!("Path not found for deletion: {path} ({e})");
                            continue;
                        }
                    };

                    let result = if metadata.is_dir() {
                        self.fs.remove_dir_all(&target).await
                    } else {
                        self.fs.unlink(&target).await
                    };
                    match result {
                        Ok(()) => changes.record(path),
                        Err(e) => log::warn!("Failed to delete {path}: {e}"),
                    }
                }
                ContentOperation::Add | ContentOperation::Edit => {
                    let Some(slide) = document.find_slide(path) else {
                        log::warn!("No matching slide found for path: {path}");
                        continue;
                    };

                    let content = slide.content.as_deref().unwrap_or_default();
                    match self.fs.write_file_all(&target, content.as_bytes()).await {
                        Ok(()) => changes.record(path),
                        Err(e) => log::warn!("Failed to write {path}: {e}"),
                    }
                }
            }
        }
    }

    /// Rename unit directories and slide files to match their names.
    async fn align_paths(&self, document: &mut CourseDocument, changes: &mut ChangeLog) -> Result<()> {
        for block in &mut document.blocks {
            for au in &mut block.aus {
                let moved = self.align_unit_dir(&mut au.dir_path, &au.au_name, changes).await?;

                for slide in &mut au.slides {
                    let original = slide.filepath.clone();
                    let cascaded = if moved {
                        join_path(&au.dir_path, file_name(&original))
                    } else {
                        original.clone()
                    };

                    let aligned = self
                        .align_slide_file(&cascaded, &slide.slide_title, &au.dir_path)
                        .await?;

                    if aligned != original {
                        changes.record(&original);
                        changes.record(&aligned);
                        slide.filepath = aligned;
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns whether the directory moved.
    async fn align_unit_dir(&self, dir_path: &mut String, au_name: &str, changes: &mut ChangeLog) -> Result<bool> {
        let slug = slugify(au_name, self.max_slug_length);
        if slug.is_empty() {
            log::debug!("Unit '{au_name}' has no usable name, keeping {dir_path}");
            return Ok(false);
        }

        let current = dir_path.clone();
        let parent = parent_dir(&current);
        let request = UniquePath::dir(&slug, parent).overwriting(&current);
        let target = create_unique_path(self.fs, &self.repo_root, &request).await?;

        if target == current {
            return Ok(false);
        }

        match self.fs.rename(&self.abs(&current), &self.abs(&target)).await {
            Ok(()) => {
                log::debug!("Renamed unit directory {current} -> {target}");
                changes.record(&current);
                changes.record(&target);
                *dir_path = target;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("Unit directory {current} is missing, leaving '{au_name}' untouched");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Final path of a slide currently at `current`.
    async fn align_slide_file(&self, current: &str, title: &str, dir: &str) -> Result<String> {
        let slug = slugify(title, self.max_slug_length);
        if slug.is_empty() {
            return Ok(current.to_string());
        }

        let expected = join_path(dir, &format!("{slug}.md"));
        if current == expected {
            return Ok(current.to_string());
        }

        let request = UniquePath::file(&slug, dir).overwriting(current);
        let target = create_unique_path(self.fs, &self.repo_root, &request).await?;
        if target == current {
            return Ok(current.to_string());
        }

        match self.fs.rename(&self.abs(current), &self.abs(&target)).await {
            Ok(()) => {
                log::debug!("Renamed slide {current} -> {target}");
                Ok(target)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("Slide file {current} is missing, keeping its path");
                Ok(current.to_string())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl RepoSession {
    /// Apply `deltas` and align the working tree with `course`, then refresh
    /// the status of every changed path. Runs one at a time per session.
    pub async fn synchronize_course(&self, course: &Course, deltas: &DeltaLog) -> Result<SyncOutcome> {
        let _guard = self.sync_lock.lock().await;

        let root = self.root();
        let synchronizer = PathSynchronizer::new(
            self.vfs.as_ref(),
            root.as_path(),
            &self.config.descriptor_filename,
            self.config.max_slug_length,
        );
        let outcome = synchronizer.synchronize(course, deltas).await?;

        self.scoped_resolve(&outcome.changed_paths).await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::course::{AssignableUnit, Block, Slide};
    use crate::core::vfs::MemoryFs;
    use std::path::Path;

    const ROOT: &str = "/memory/repo";

    fn course_with(au_name: &str, dir_path: &str, slides: Vec<Slide>) -> Course {
        Course {
            base_path: "course".to_string(),
            data: CourseDocument {
                course_title: "Course".to_string(),
                blocks: vec![Block {
                    block_name: "course".to_string(),
                    aus: vec![AssignableUnit {
                        au_name: au_name.to_string(),
                        dir_path: dir_path.to_string(),
                        slides,
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            },
        }
    }

    async fn seeded_fs(files: &[&str]) -> MemoryFs {
        let fs = MemoryFs::new();
        fs.write_file_all(Path::new(&format!("{ROOT}/course/RC5.yaml")), b"blocks: []\n")
            .await
            .unwrap();
        for file in files {
            fs.write_file_all(&Path::new(ROOT).join(file), b"content")
                .await
                .unwrap();
        }
        fs
    }

    #[tokio::test]
    async fn test_missing_descriptor_is_rejected() {
        let fs = MemoryFs::new();
        let synchronizer = PathSynchronizer::new(&fs, ROOT, "RC5.yaml", 100);
        let course = course_with("Unit", "course/unit", vec![]);

        let result = synchronizer.synchronize(&course, &DeltaLog::new()).await;
        assert!(matches!(result, Err(SyncError::CourseDescriptorMissing { .. })));
    }

    #[tokio::test]
    async fn test_slide_renamed_to_title_slug() {
        let fs = seeded_fs(&["course/unit/old-name.md"]).await;
        let synchronizer = PathSynchronizer::new(&fs, ROOT, "RC5.yaml", 100);
        let course = course_with(
            "Unit",
            "course/unit",
            vec![Slide::markdown("Fresh Title", "course/unit/old-name.md")],
        );

        let outcome = synchronizer.synchronize(&course, &DeltaLog::new()).await.unwrap();

        let slide = &outcome.document.blocks[0].aus[0].slides[0];
        assert_eq!(slide.filepath, "course/unit/fresh-title.md");
        assert!(fs.exists(Path::new("/memory/repo/course/unit/fresh-title.md")).await.unwrap());
        assert!(!fs.exists(Path::new("/memory/repo/course/unit/old-name.md")).await.unwrap());
        assert_eq!(
            outcome.changed_paths,
            vec![
                "course/unit/old-name.md",
                "course/unit/fresh-title.md",
                "course/RC5.yaml"
            ]
        );
    }

    #[tokio::test]
    async fn test_collision_gets_suffix_and_is_stable() {
        let fs = seeded_fs(&["course/unit/intro.md", "course/unit/draft.md"]).await;
        let synchronizer = PathSynchronizer::new(&fs, ROOT, "RC5.yaml", 100);
        let course = course_with(
            "Unit",
            "course/unit",
            vec![
                Slide::markdown("Intro", "course/unit/intro.md"),
                Slide::markdown("Intro", "course/unit/draft.md"),
            ],
        );

        let first = synchronizer.synchronize(&course, &DeltaLog::new()).await.unwrap();
        let slides = &first.document.blocks[0].aus[0].slides;
        assert_eq!(slides[0].filepath, "course/unit/intro.md");
        assert_eq!(slides[1].filepath, "course/unit/intro-1.md");

        let again = Course {
            base_path: "course".to_string(),
            data: first.document.clone(),
        };
        let second = synchronizer.synchronize(&again, &DeltaLog::new()).await.unwrap();
        assert_eq!(second.changed_paths, vec!["course/RC5.yaml"]);
    }

    #[tokio::test]
    async fn test_deltas_write_and_delete() {
        let fs = seeded_fs(&["course/unit/gone.md", "course/unit/keep.md"]).await;
        let synchronizer = PathSynchronizer::new(&fs, ROOT, "RC5.yaml", 100);
        let course = course_with(
            "Unit",
            "course/unit",
            vec![
                Slide::markdown("Keep", "course/unit/keep.md").with_content("# Keep"),
                Slide::markdown("New", "course/unit/new.md").with_content("# New"),
            ],
        );

        let mut deltas = DeltaLog::new();
        deltas.insert("course/unit/gone.md".to_string(), ContentOperation::Delete);
        deltas.insert("course/unit/missing.md".to_string(), ContentOperation::Delete);
        deltas.insert("course/unit/new.md".to_string(), ContentOperation::Add);
        deltas.insert("course/unit/orphan.md".to_string(), ContentOperation::Edit);

        let outcome = synchronizer.synchronize(&course, &deltas).await.unwrap();

        assert!(!fs.exists(Path::new("/memory/repo/course/unit/gone.md")).await.unwrap());
        assert_eq!(
            fs.read_to_string(Path::new("/memory/repo/course/unit/new.md")).await.unwrap(),
            "# New"
        );
        assert!(outcome.changed_paths.contains(&"course/unit/gone.md".to_string()));
        assert!(outcome.changed_paths.contains(&"course/unit/new.md".to_string()));
        assert!(!outcome.changed_paths.contains(&"course/unit/missing.md".to_string()));
        assert!(!outcome.changed_paths.contains(&"course/unit/orphan.md".to_string()));

        let descriptor = fs
            .read_to_string(Path::new("/memory/repo/course/RC5.yaml"))
            .await
            .unwrap();
        assert!(!descriptor.contains("# New"));
    }

    #[tokio::test]
    async fn test_missing_unit_directory_is_left_untouched() {
        let fs = seeded_fs(&[]).await;
        let synchronizer = PathSynchronizer::new(&fs, ROOT, "RC5.yaml", 100);
        let course = course_with("Renamed Unit", "course/old-unit", vec![]);

        let outcome = synchronizer.synchronize(&course, &DeltaLog::new()).await.unwrap();

        assert_eq!(outcome.document.blocks[0].aus[0].dir_path, "course/old-unit");
        assert_eq!(outcome.changed_paths, vec!["course/RC5.yaml"]);
    }
}
