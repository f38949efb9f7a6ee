//! Firmware checker configuration
//!
//! Supports JSON and TOML files. The data directory holds the working rule file and
//! the persisted result of the last successful check:
//! - `firmware/types.json`
//! - `firmware/current.json`

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default time to wait for a response, in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 600_000;

/// When firmware checks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckFirmwareMode {
    /// Check whenever the printer becomes operational
    #[default]
    OnConnect,
    /// Only check when asked to
    ManualOnly,
    /// Never check
    Disabled,
}

impl std::fmt::Display for CheckFirmwareMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnConnect => write!(f, "on_connect"),
            Self::ManualOnly => write!(f, "manual_only"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Firmware checker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// When checks run
    pub check_firmware: CheckFirmwareMode,
    /// Identification request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Capability probe timeout in milliseconds
    pub probe_timeout_ms: u64,
    /// Directory holding the rule file and the persisted result
    pub data_directory: PathBuf,
    /// Defaults used to recreate the rule file; the embedded document when unset
    pub defaults_path: Option<PathBuf>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            check_firmware: CheckFirmwareMode::default(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            probe_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            data_directory: Self::default_data_directory(),
            defaults_path: None,
        }
    }
}

impl CheckerConfig {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Config rooted at `data_directory`
    pub fn with_data_directory(data_directory: impl Into<PathBuf>) -> Self {
        Self {
            data_directory: data_directory.into(),
            ..Self::default()
        }
    }

    /// Platform data directory, e.g. `~/.local/share/arcprobe` on Linux
    pub fn default_data_directory() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("arcprobe")
    }

    /// Working rule file
    pub fn rules_path(&self) -> PathBuf {
        self.data_directory.join("firmware").join("types.json")
    }

    /// Persisted result of the last successful check
    pub fn current_firmware_path(&self) -> PathBuf {
        self.data_directory.join("firmware").join("current.json")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        self.validate()?;

        let content = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::to_string_pretty(self)?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "request_timeout_ms".to_string(),
                reason: "must be > 0".to_string(),
            });
        }

        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "probe_timeout_ms".to_string(),
                reason: "must be > 0".to_string(),
            });
        }

        if self.data_directory.as_os_str().is_empty() {
            return Err(ConfigError::InvalidSetting {
                key: "data_directory".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CheckerConfig::new();
        assert_eq!(config.check_firmware, CheckFirmwareMode::OnConnect);
        assert_eq!(config.request_timeout(), Duration::from_secs(600));
        assert!(config.data_directory.ends_with("arcprobe"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derived_paths() {
        let config = CheckerConfig::with_data_directory("/var/lib/arcprobe");
        assert_eq!(
            config.rules_path(),
            PathBuf::from("/var/lib/arcprobe/firmware/types.json")
        );
        assert_eq!(
            config.current_firmware_path(),
            PathBuf::from("/var/lib/arcprobe/firmware/current.json")
        );
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = CheckerConfig {
            request_timeout_ms: 0,
            ..CheckerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_invalid_setting());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("arcprobe.toml");
        let config = CheckerConfig {
            check_firmware: CheckFirmwareMode::ManualOnly,
            request_timeout_ms: 100_000,
            defaults_path: Some(dir.path().join("types_default.json")),
            ..CheckerConfig::with_data_directory(dir.path())
        };

        config.save_to_file(&path).unwrap();
        let loaded = CheckerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_json_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("arcprobe.json");
        std::fs::write(&path, r#"{ "check_firmware": "disabled" }"#).unwrap();

        let loaded = CheckerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.check_firmware, CheckFirmwareMode::Disabled);
        assert_eq!(loaded.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("arcprobe.yaml");
        std::fs::write(&path, "check_firmware: disabled").unwrap();
        assert!(matches!(
            CheckerConfig::load_from_file(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
