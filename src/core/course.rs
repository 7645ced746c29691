//! Course document model.
//!
//! A course is a directory holding a YAML descriptor (`RC5.yaml`) that
//! lists blocks, their assignable units (one directory each) and the slides
//! of each unit (one markdown file each). Fields this crate does not know
//! about are carried through untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const RC5_VERSION: &str = "1.0";
pub const SLIDE_TYPE_MARKDOWN: &str = "markdown";
pub const DEFAULT_SLIDE_TITLE: &str = "Slide 1";
pub const DEFAULT_SLIDE_CONTENT: &str = "New Slide";

type Extra = BTreeMap<String, serde_yaml::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDocument {
    #[serde(default)]
    pub course_title: String,
    #[serde(default)]
    pub course_description: String,
    #[serde(default)]
    pub course_id: String,
    #[serde(default)]
    pub rc5_version: String,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(default)]
    pub block_name: String,
    #[serde(default)]
    pub block_description: String,
    #[serde(default)]
    pub aus: Vec<AssignableUnit>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A unit of the course; owns one directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignableUnit {
    pub au_name: String,
    /// Repo-relative directory of the unit.
    pub dir_path: String,
    #[serde(default)]
    pub slides: Vec<Slide>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub slide_title: String,
    #[serde(rename = "type", default = "markdown")]
    pub slide_type: String,
    /// Repo-relative path of the slide file.
    pub filepath: String,
    /// Editor-side content. Never written to the descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

fn markdown() -> String {
    SLIDE_TYPE_MARKDOWN.to_string()
}

impl Slide {
    pub fn markdown(title: impl Into<String>, filepath: impl Into<String>) -> Self {
        Self {
            slide_title: title.into(),
            slide_type: markdown(),
            filepath: filepath.into(),
            content: None,
            extra: Extra::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

impl CourseDocument {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Copy of the document with every slide's content removed.
    pub fn strip_content(&self) -> Self {
        let mut stripped = self.clone();
        for slide in stripped.slides_mut() {
            slide.content = None;
        }
        stripped
    }

    pub fn slides(&self) -> impl Iterator<Item = &Slide> {
        self.blocks
            .iter()
            .flat_map(|block| block.aus.iter())
            .flat_map(|au| au.slides.iter())
    }

    pub fn slides_mut(&mut self) -> impl Iterator<Item = &mut Slide> {
        self.blocks
            .iter_mut()
            .flat_map(|block| block.aus.iter_mut())
            .flat_map(|au| au.slides.iter_mut())
    }

    pub fn find_slide(&self, filepath: &str) -> Option<&Slide> {
        self.slides().find(|slide| slide.filepath == filepath)
    }
}

/// A course descriptor together with the directory it lives in.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    /// Repo-relative course directory.
    pub base_path: String,
    pub data: CourseDocument,
}

/// Pending change to a slide file, keyed by its intended final path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentOperation {
    Add,
    Edit,
    Delete,
}

/// Ordered log of content changes since the last synchronization.
pub type DeltaLog = BTreeMap<String, ContentOperation>;
