//! Application directory paths for davetjet.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data | `~/Library/Application Support/davetjet/` | `~/.local/share/davetjet/` |
//! | Config | `~/Library/Application Support/davetjet/` | `~/.config/davetjet/` |
//!
//! # Environment Overrides
//!
//! - `DAVETJET_DATA_DIR` overrides [`data_dir`]
//! - `DAVETJET_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory. Holds the persisted state file.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("DAVETJET_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("davetjet"))
        .unwrap_or_else(|| PathBuf::from("/tmp/davetjet-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("DAVETJET_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("davetjet"))
        .unwrap_or_else(|| PathBuf::from("/tmp/davetjet-config"))
}

/// `config_dir()/config.toml`.
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// `data_dir()/state.json`, the default [`FileStore`](crate::storage::FileStore) location.
#[must_use]
pub fn state_file() -> PathBuf {
    data_dir().join("state.json")
}
