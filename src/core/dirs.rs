use crate::core::error::SyncError;
use std::path::PathBuf;

const APP_DIR: &str = "course-git-sync";

pub fn get_config_directory() -> Result<PathBuf, SyncError> {
    let base = match std::env::consts::OS {
        "linux" | "freebsd" | "netbsd" | "openbsd" => std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::home_dir().unwrap_or_default().join(".config")),
        "macos" => dirs::home_dir()
            .unwrap_or_default()
            .join("Library/Application Support"),
        _ => dirs::config_dir().unwrap_or_default(),
    };

    Ok(base.join(APP_DIR))
}

pub fn get_cache_directory() -> Result<PathBuf, SyncError> {
    let base = match std::env::consts::OS {
        "linux" | "freebsd" | "netbsd" | "openbsd" => std::env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::home_dir().unwrap_or_default().join(".cache")),
        "macos" => dirs::home_dir().unwrap_or_default().join("Library/Caches"),
        _ => dirs::cache_dir().ok_or(SyncError::CacheDirectoryNotFound)?,
    };

    Ok(base.join(APP_DIR))
}

/// Durable, application-owned storage for repositories.
pub fn get_data_directory() -> Result<PathBuf, SyncError> {
    let base = match std::env::consts::OS {
        "linux" | "freebsd" | "netbsd" | "openbsd" => std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::home_dir().unwrap_or_default().join(".local/share")),
        _ => dirs::data_dir().unwrap_or_default(),
    };

    Ok(base.join(APP_DIR))
}
