use crate::core::dirs::{get_cache_directory, get_config_directory, get_data_directory};
use crate::core::error::SyncError;
use crate::core::state::Author;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_REMOTE: &str = "origin";
pub const CONFLICT_SENTINEL: &str = ".git/failedMerge.txt";
pub const COURSE_DESCRIPTOR: &str = "RC5.yaml";
pub const MAX_FS_SLUG_LENGTH: usize = 100;

/// Engine-wide settings, persisted as `config.json` in the config directory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Root of the durable, app-owned repository storage.
    pub storage_root: PathBuf,
    /// Root under which native-filesystem repositories live.
    pub native_root: PathBuf,
    /// Home of the per-repo status caches.
    pub cache_dir: PathBuf,
    pub default_branch: String,
    pub remote_name: String,
    /// Identity used when neither the caller nor the repository provides one.
    pub author: Author,
    /// Repo-relative path of the merge conflict sentinel.
    pub conflict_sentinel: String,
    pub descriptor_filename: String,
    pub max_slug_length: usize,
    pub stash_message: String,
    /// Delete stash-deleted files from the working tree before popping.
    pub stash_pop_removes_deleted: bool,
    pub clone_depth: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = get_data_directory().unwrap_or_else(|_| std::env::temp_dir());
        let cache_dir = get_cache_directory()
            .unwrap_or_else(|_| std::env::temp_dir().join("course-git-sync-cache"));

        Self {
            storage_root: data_dir.join("repositories"),
            native_root: dirs::document_dir()
                .unwrap_or_else(|| data_dir.join("native"))
                .join("Courses"),
            cache_dir,
            default_branch: DEFAULT_BRANCH.to_string(),
            remote_name: DEFAULT_REMOTE.to_string(),
            author: Author::default(),
            conflict_sentinel: CONFLICT_SENTINEL.to_string(),
            descriptor_filename: COURSE_DESCRIPTOR.to_string(),
            max_slug_length: MAX_FS_SLUG_LENGTH,
            stash_message: "Stash changes".to_string(),
            stash_pop_removes_deleted: true,
            clone_depth: None,
        }
    }
}

impl EngineConfig {
    /// A configuration whose storage, native and cache roots all live under `root`.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            storage_root: root.join("storage"),
            native_root: root.join("native"),
            cache_dir: root.join("cache"),
            ..Self::default()
        }
    }

    pub fn load_or_create() -> Result<Self, SyncError> {
        let config_file = get_config_directory()?.join("config.json");

        if config_file.exists() {
            Self::load_from(&config_file)
        } else {
            let config = Self::default();
            config.save_to(&config_file)?;
            log::info!("Created default configuration at {}", config_file.display());
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SyncError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) -> Result<(), SyncError> {
        self.save_to(&get_config_directory()?.join("config.json"))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SyncError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Remote-tracking ref for `branch` on the configured remote.
    pub fn remote_ref(&self, branch: &str) -> String {
        format!("refs/remotes/{}/{}", self.remote_name, branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rooted_config_places_everything_under_root() {
        let config = EngineConfig::rooted_at("/tmp/engine");
        assert_eq!(config.storage_root, PathBuf::from("/tmp/engine/storage"));
        assert_eq!(config.native_root, PathBuf::from("/tmp/engine/native"));
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/engine/cache"));
        assert_eq!(config.default_branch, "main");
        assert_eq!(config.max_slug_length, 100);
    }

    #[test]
    fn test_save_and_load_round_trip() -> Result<(), SyncError> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("config.json");

        let mut config = EngineConfig::rooted_at(temp_dir.path());
        config.default_branch = "trunk".to_string();
        config.save_to(&path)?;

        assert_eq!(EngineConfig::load_from(&path)?, config);
        Ok(())
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() -> Result<(), SyncError> {
        let config: EngineConfig = serde_json::from_str(r#"{"default_branch": "develop"}"#)?;
        assert_eq!(config.default_branch, "develop");
        assert_eq!(config.conflict_sentinel, ".git/failedMerge.txt");
        assert_eq!(config.descriptor_filename, "RC5.yaml");
        Ok(())
    }

    #[test]
    fn test_remote_ref() {
        let config = EngineConfig::default();
        assert_eq!(config.remote_ref("main"), "refs/remotes/origin/main");
    }
}
