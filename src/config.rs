//! Application configuration, loaded from TOML.
//!
//! ```toml
//! [transport]
//! timeout_ms = 12000
//! retries = 1
//!
//! [intercept]
//! origin = "https://app.davetjet.com"
//! api_prefix = "/api/"
//!
//! [tasks]
//! create_url = "/dashboard/invitations/create-new"
//!
//! [storage]
//! state_file = "/var/lib/davetjet/state.json"
//! ```
//!
//! Every section and field is optional.

use crate::error::{AppError, Result};
use davetjet_transport::{InterceptPolicy, InterceptSettings, RequestConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Links behind the redirect tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    pub create_url: String,
    pub send_url: String,
    pub analytics_url: String,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            create_url: "/dashboard/invitations/create-new".to_owned(),
            send_url: "/dashboard/sending".to_owned(),
            analytics_url: "/dashboard/analytics".to_owned(),
        }
    }
}

/// Where persisted state lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// State file path. Defaults to [`crate::app_dirs::state_file`].
    pub state_file: Option<PathBuf>,
}

impl StorageSettings {
    pub fn resolved_state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(crate::app_dirs::state_file)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Defaults for every executor call.
    pub transport: RequestConfig,
    /// Facade interception rules.
    pub intercept: InterceptSettings,
    pub tasks: TaskSettings,
    pub storage: StorageSettings,
}

impl AppConfig {
    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] for invalid request defaults and
    /// [`AppError::Transport`] for an unusable intercept section.
    pub fn validate(&self) -> Result<()> {
        self.transport
            .validate()
            .map_err(|e| AppError::Config(format!("[transport] {e}")))?;
        InterceptPolicy::from_settings(&self.intercept)?;
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/davetjet/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }
}
