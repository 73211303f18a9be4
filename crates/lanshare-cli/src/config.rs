//! Configuration management for `lanshare`.
//!
//! The config file lives at a platform-appropriate location:
//! - Linux: `~/.config/lanshare/config.toml`
//! - macOS: `~/Library/Application Support/lanshare/config.toml`
//!
//! On first run, no config file exists. The CLI detects this and creates
//! one with a fresh `device_id` and the user's chosen alias.
//!
//! # Config File Format (TOML)
//!
//! ```toml
//! device_id = "550e8400-e29b-41d4-a716-446655440000"
//! alias = "PC-Sala"
//! listen_port = 0        # 0 means auto-assign
//! download_dir = "~/Downloads/lanshare"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file at {path}: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },

    #[error("failed to write config file at {path}: {source}")]
    WriteFile { path: PathBuf, source: std::io::Error },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("could not determine config directory for this platform")]
    NoConfigDir,
}

/// The persisted configuration for this `lanshare` instance.
///
/// All fields have sensible defaults except `device_id`, which is
/// generated once on first run and never regenerated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Stable UUIDv4 identifying this device; the peer table's key.
    pub device_id: String,

    /// Human-readable name advertised to other peers.
    pub alias: String,

    /// TCP port this device accepts transfer connections on.
    /// `0` means the OS assigns a random available port.
    #[serde(default)]
    pub listen_port: u16,

    /// Destination directory for received files. `~` is expanded at load
    /// time by [`AppConfig::download_dir`]; the raw, possibly-`~`-prefixed
    /// string is what's persisted.
    #[serde(default)]
    pub download_dir: Option<String>,
}

impl AppConfig {
    /// Returns the platform-appropriate config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("lanshare"))
    }

    /// Returns the full path to the config file.
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir().ok_or(ConfigError::NoConfigDir)?.join("config.toml"))
    }

    /// Returns the platform-appropriate data directory for the log file.
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("lanshare"))
    }

    /// Returns the default destination directory for received files:
    /// `~/Downloads/lanshare` (or the platform's home dir equivalent) when
    /// no `download_dir` is configured.
    pub fn default_download_dir() -> PathBuf {
        dirs::download_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default())
            .join("lanshare")
    }

    /// The resolved, `~`-expanded destination directory for received
    /// files: the configured `download_dir` if set, otherwise
    /// [`Self::default_download_dir`].
    pub fn resolved_download_dir(&self) -> PathBuf {
        match &self.download_dir {
            Some(raw) => expand_tilde(raw),
            None => Self::default_download_dir(),
        }
    }

    /// Loads the config from the default config file path.
    ///
    /// Returns `Ok(None)` if the config file doesn't exist yet (first run).
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    /// Loads the config from a specific file path. Returns `Ok(None)` if
    /// the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile { path: path.to_owned(), source: e })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFile { path: path.to_owned(), source: e })?;
        Ok(Some(config))
    }

    /// Saves this config to the default config file path.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    /// Saves this config to a specific file path, creating parent
    /// directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFile { path: path.to_owned(), source: e })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| ConfigError::WriteFile { path: path.to_owned(), source: e })?;
        Ok(())
    }

    /// Creates a new config for first-run with a fresh `device_id`.
    pub fn new_first_run(alias: &str) -> Self {
        Self {
            device_id: lanshare_core::identity::new_id(),
            alias: alias.to_string(),
            listen_port: 0,
            download_dir: None,
        }
    }
}

/// Expands a leading `~` or `~/...` to the user's home directory. Any
/// other form of `path` is returned unchanged.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        let config = AppConfig {
            device_id: "test-device-id".to_string(),
            alias: "kitchen-pc".to_string(),
            listen_port: 53318,
            download_dir: None,
        };

        config.save_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap().unwrap();

        assert_eq!(loaded.device_id, "test-device-id");
        assert_eq!(loaded.alias, "kitchen-pc");
        assert_eq!(loaded.listen_port, 53318);
    }

    #[test]
    fn config_missing_file_returns_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nonexistent.toml");
        let result = AppConfig::load_from(&path).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn config_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("deep").join("nested").join("config.toml");

        let config = AppConfig::new_first_run("Test");
        config.save_to(&path).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn first_run_generates_unique_ids() {
        let a = AppConfig::new_first_run("A");
        let b = AppConfig::new_first_run("B");
        assert_ne!(a.device_id, b.device_id);
    }

    #[test]
    fn tilde_expansion_uses_home_dir() {
        let Some(home) = dirs::home_dir() else { return };
        let expanded = expand_tilde("~/Downloads/lanshare");
        assert_eq!(expanded, home.join("Downloads/lanshare"));
    }

    #[test]
    fn non_tilde_path_is_unchanged() {
        let expanded = expand_tilde("/srv/lanshare");
        assert_eq!(expanded, PathBuf::from("/srv/lanshare"));
    }
}
