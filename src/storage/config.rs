//! Configuration handling for prefstore
//!
//! Configuration is stored in `~/.config/prefstore/config.toml` (or the
//! platform equivalent) unless an explicit path is given.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::error::StoreError;

/// Default name of the preferences file when none is configured
pub const DEFAULT_FILE_NAME: &str = "prefs.json";

/// Store-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Permission bits applied to the preferences file after each write
    pub mode: u32,

    /// An fsync slower than this (milliseconds) is logged
    pub slow_fsync_ms: u64,

    /// Log fsync statistics every this many syncs
    pub sync_log_interval: u32,

    /// Debounce delay for the external-change watcher (milliseconds)
    pub watch_debounce_ms: u64,

    /// Preferences file used by the CLI when `--file` is not given
    pub default_file: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: 0o660,
            slow_fsync_ms: 256,
            sync_log_interval: 1024,
            watch_debounce_ms: 200,
            default_file: None,
        }
    }
}

impl StoreConfig {
    /// Returns the global config directory
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "prefstore", "prefstore").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns the directory holding the default preferences file
    pub fn data_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "prefstore", "prefstore").map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Loads configuration from the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        match Self::config_dir() {
            Some(dir) => Self::load_from(&dir.join("config.toml")),
            None => Ok(Self::default()),
        }
    }

    /// Loads configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Parses configuration from TOML text
    pub fn parse(content: &str) -> std::result::Result<Self, StoreError> {
        let config: Self = toml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), StoreError> {
        if self.mode > 0o7777 {
            return Err(StoreError::Config(format!(
                "mode {:o} is not a valid permission mask",
                self.mode
            )));
        }
        Ok(())
    }

    /// Resolves the preferences file: explicit path, then the configured
    /// default, then `prefs.json` in the platform data directory.
    pub fn resolve_file(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = &self.default_file {
            return Ok(path.clone());
        }
        Self::data_dir()
            .map(|dir| dir.join(DEFAULT_FILE_NAME))
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory; pass --file"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.mode, 0o660);
        assert_eq!(config.slow_fsync_ms, 256);
        assert_eq!(config.sync_log_interval, 1024);
        assert!(config.default_file.is_none());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
mode = 384
slow_fsync_ms = 50
"#;

        let config = StoreConfig::parse(toml).unwrap();
        assert_eq!(config.mode, 0o600);
        assert_eq!(config.slow_fsync_ms, 50);
        assert_eq!(config.sync_log_interval, 1024);
    }

    #[test]
    fn parse_rejects_bad_mode() {
        let err = StoreConfig::parse("mode = 99999").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn parse_rejects_malformed_toml() {
        assert!(matches!(
            StoreConfig::parse("mode = "),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::load_from(&dir.path().join("none.toml")).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn serialized_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("config.toml");
        let config = StoreConfig {
            default_file: Some(dir.path().join("app.json")),
            watch_debounce_ms: 10,
            ..StoreConfig::default()
        };

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(StoreConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn resolve_file_prefers_explicit_path() {
        let config = StoreConfig {
            default_file: Some(PathBuf::from("/etc/app.json")),
            ..StoreConfig::default()
        };

        assert_eq!(
            config.resolve_file(Some(Path::new("/tmp/x.json"))).unwrap(),
            PathBuf::from("/tmp/x.json")
        );
        assert_eq!(
            config.resolve_file(None).unwrap(),
            PathBuf::from("/etc/app.json")
        );
    }
}
