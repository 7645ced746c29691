//! Course discovery and creation inside a repository.

use crate::core::course::{
    AssignableUnit, Block, Course, CourseDocument, Slide, DEFAULT_SLIDE_CONTENT, DEFAULT_SLIDE_TITLE,
    RC5_VERSION,
};
use crate::core::error::{Result, SyncError};
use crate::core::paths::{create_unique_path, join_path, parent_dir, slugify, UniquePath};
use crate::core::session::RepoSession;
use crate::core::vfs::EntryKind;
use serde::{Deserialize, Serialize};
use std::io;

const FIRST_SLIDE_TITLE: &str = "01 slide";

/// Parameters for [`RepoSession::create_course`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub course_id: String,
    /// Name of the first assignable unit.
    pub au_name: String,
}

impl RepoSession {
    /// Every course in the repository, located by its descriptor file.
    ///
    /// The `.git` directory is not searched. Descriptors that fail to parse
    /// are logged and skipped.
    pub async fn find_all_courses(&self) -> Result<Vec<Course>> {
        let descriptor_name = self.config.descriptor_filename.as_str();
        let mut pending = vec![String::new()];
        let mut courses = Vec::new();

        while let Some(dir) = pending.pop() {
            for entry in self.vfs.readdir(&self.path_of(&dir)).await? {
                let relative = join_path(&dir, &entry.name);
                match entry.kind {
                    EntryKind::Directory if entry.name != ".git" => pending.push(relative),
                    EntryKind::File if entry.name == descriptor_name => {
                        let text = self.vfs.read_to_string(&self.path_of(&relative)).await?;
                        match CourseDocument::from_yaml(&text) {
                            Ok(data) => courses.push(Course {
                                base_path: parent_dir(&relative).to_string(),
                                data,
                            }),
                            Err(e) => log::warn!("Skipping unreadable course descriptor {relative}: {e}"),
                        }
                    }
                    _ => {}
                }
            }
        }

        courses.sort_by(|a, b| a.base_path.cmp(&b.base_path));
        log::debug!("Found {} courses in {}", courses.len(), self.repo);
        Ok(courses)
    }

    /// Read a course descriptor and the content of each of its slides.
    ///
    /// Slides whose file is missing keep `content: None`.
    pub async fn load_course(&self, base_path: &str) -> Result<Course> {
        let descriptor = join_path(base_path, &self.config.descriptor_filename);
        let text = match self.vfs.read_to_string(&self.path_of(&descriptor)).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SyncError::CourseDescriptorMissing { path: descriptor })
            }
            Err(e) => return Err(e.into()),
        };

        let mut data = CourseDocument::from_yaml(&text)?;
        for slide in data.slides_mut() {
            match self.vfs.read_to_string(&self.path_of(&slide.filepath)).await {
                Ok(content) => slide.content = Some(content),
                Err(e) => log::warn!("Could not read slide {}: {e}", slide.filepath),
            }
        }

        Ok(Course {
            base_path: base_path.to_string(),
            data,
        })
    }

    /// Create a course directory with one unit holding one slide, and its descriptor.
    pub async fn create_course(&self, request: &NewCourse) -> Result<Course> {
        let max = self.config.max_slug_length;
        let course_path = slugify(&request.title, max);
        if course_path.is_empty() {
            return Err(SyncError::invalid_path(&request.title, "course title has no usable characters"));
        }
        if self.vfs.exists(&self.path_of(&course_path)).await? {
            return Err(SyncError::CourseNameInUse { name: course_path });
        }

        let au_slug = slugify(&request.au_name, max);
        if au_slug.is_empty() {
            return Err(SyncError::invalid_path(&request.au_name, "unit name has no usable characters"));
        }
        let au_dir = join_path(&course_path, &au_slug);
        let slide_path = join_path(&au_dir, &format!("{}.md", slugify(FIRST_SLIDE_TITLE, max)));

        let data = CourseDocument {
            course_title: request.title.clone(),
            course_description: request.description.clone(),
            course_id: request.course_id.clone(),
            rc5_version: RC5_VERSION.to_string(),
            blocks: vec![Block {
                block_name: course_path.clone(),
                aus: vec![AssignableUnit {
                    au_name: request.au_name.clone(),
                    dir_path: au_dir,
                    slides: vec![Slide::markdown(FIRST_SLIDE_TITLE, slide_path.clone())
                        .with_content(DEFAULT_SLIDE_CONTENT)],
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        self.vfs
            .write_file_all(&self.path_of(&slide_path), DEFAULT_SLIDE_CONTENT.as_bytes())
            .await?;
        let descriptor = join_path(&course_path, &self.config.descriptor_filename);
        self.vfs
            .write_file_all(&self.path_of(&descriptor), data.strip_content().to_yaml()?.as_bytes())
            .await?;

        log::info!("Created course '{}' at {course_path}", request.title);
        self.scoped_resolve(&[course_path.clone()]).await?;

        Ok(Course {
            base_path: course_path,
            data,
        })
    }

    /// Return `document` with a new unit appended to block `block_index`.
    ///
    /// The unit gets a directory name under `course_path` taken neither on
    /// disk nor by another unit of `document`, and a single default slide. Nothing is written; synchronize the course to
    /// create the files.
    pub async fn create_lesson(
        &self,
        document: &CourseDocument,
        block_index: usize,
        au_name: &str,
        course_path: &str,
    ) -> Result<CourseDocument> {
        if block_index >= document.blocks.len() {
            return Err(SyncError::not_found(format!("block {block_index}")));
        }

        let max = self.config.max_slug_length;
        let slug = slugify(au_name, max);
        if slug.is_empty() {
            return Err(SyncError::invalid_path(au_name, "unit name has no usable characters"));
        }

        // Units not yet synchronized only exist in the document
        let claimed: Vec<String> = document
            .blocks
            .iter()
            .flat_map(|block| block.aus.iter().map(|au| au.dir_path.clone()))
            .collect();

        let root = self.root();
        let request = UniquePath::dir(&slug, course_path).reserving(&claimed);
        let dir_path = create_unique_path(self.vfs.as_ref(), &root, &request).await?;
        let slide_path = join_path(&dir_path, &format!("{}.md", slugify(DEFAULT_SLIDE_TITLE, max)));

        let mut updated = document.clone();
        updated.blocks[block_index].aus.push(AssignableUnit {
            au_name: au_name.to_string(),
            dir_path,
            slides: vec![Slide::markdown(DEFAULT_SLIDE_TITLE, slide_path).with_content(DEFAULT_SLIDE_CONTENT)],
            ..Default::default()
        });

        Ok(updated)
    }
}
