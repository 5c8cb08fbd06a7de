//! Centralized path functions for all app storage locations.

use std::path::PathBuf;

const APP_DIR: &str = "stemsmith";

/// App config root: `~/Library/Application Support/stemsmith/` (macOS) or `~/.config/stemsmith/` (Linux).
pub fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR))
}

/// App cache root: `~/Library/Caches/stemsmith/` (macOS) or `~/.cache/stemsmith/` (Linux).
pub fn app_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join(APP_DIR))
}

/// Persisted client preferences: `<app_config_dir>/preferences.json`.
pub fn preferences_path() -> Option<PathBuf> {
    app_config_dir().map(|d| d.join("preferences.json"))
}

/// Rolling log files: `<app_cache_dir>/logs/`.
pub fn log_dir() -> Option<PathBuf> {
    app_cache_dir().map(|d| d.join("logs"))
}

/// Default target for downloaded artifacts: the user's download dir, else the cwd.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}
