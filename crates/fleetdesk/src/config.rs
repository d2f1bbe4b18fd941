//! Configuration management for fleetdesk.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "fleetdesk";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "fleet.db";

/// Default workbook file name.
const SHEET_FILE_NAME: &str = "fleet-workbook.json";

/// Prefix for environment overrides; nested keys are separated by `__`.
const ENV_PREFIX: &str = "FLEETDESK_";

/// Largest accepted distance from UTC, in minutes.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `FLEETDESK_`, e.g.
///    `FLEETDESK_WORKFLOW__LOCK_TIMEOUT_MS`)
/// 2. TOML config file at `~/.config/fleetdesk/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Record store configuration.
    pub store: StoreConfig,
    /// Workflow engine configuration.
    pub workflow: WorkflowConfig,
}

/// Which record store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Relational database file.
    #[default]
    Sqlite,
    /// Spreadsheet workbook file.
    Sheet,
    /// Process memory; nothing survives exit. Meant for embedding the
    /// library and for tests, `fleetctl` refuses it.
    Memory,
}

impl StoreBackend {
    /// Whether records outlive the process that wrote them.
    #[must_use]
    pub fn is_persistent(self) -> bool {
        !matches!(self, Self::Memory)
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Sheet => write!(f, "sheet"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection.
    pub backend: StoreBackend,
    /// Path to the database file.
    /// Defaults to `~/.local/share/fleetdesk/fleet.db`
    pub database_path: Option<PathBuf>,
    /// Path to the workbook file.
    /// Defaults to `~/.local/share/fleetdesk/fleet-workbook.json`
    pub sheet_path: Option<PathBuf>,
}

/// Workflow engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// How long depart/arrive wait for a busy vehicle before giving up.
    pub lock_timeout_ms: u64,
    /// Regex a normalized plate must match when registering a vehicle or
    /// booking one.
    pub plate_pattern: String,
    /// Fleet's local offset from UTC in minutes; decides what "today" means.
    pub utc_offset_minutes: i32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            plate_pattern: r"^[A-Z0-9][A-Z0-9-]{1,9}$".to_string(),
            utc_offset_minutes: -180,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `FLEETDESK_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.workflow.lock_timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "lock_timeout_ms must be greater than 0".to_string(),
            });
        }

        self.plate_regex()?;

        if self.workflow.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(Error::ConfigValidation {
                message: format!(
                    "utc_offset_minutes ({}) must be within +/-{MAX_UTC_OFFSET_MINUTES}",
                    self.workflow.utc_offset_minutes
                ),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the workbook path, resolving defaults if not set.
    #[must_use]
    pub fn sheet_path(&self) -> PathBuf {
        self.store
            .sheet_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(SHEET_FILE_NAME))
    }

    /// Get the lock timeout as a Duration.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.workflow.lock_timeout_ms)
    }

    /// Compile the plate pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid regex.
    pub fn plate_regex(&self) -> Result<Regex> {
        Regex::new(&self.workflow.plate_pattern).map_err(|e| Error::ConfigValidation {
            message: format!("invalid plate_pattern {}: {e}", self.workflow.plate_pattern),
        })
    }

    /// The fleet's local UTC offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is out of range.
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.workflow.utc_offset_minutes * 60).ok_or_else(|| {
            Error::ConfigValidation {
                message: format!(
                    "utc_offset_minutes ({}) is out of range",
                    self.workflow.utc_offset_minutes
                ),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_backend_persistence() {
        assert!(StoreBackend::Sqlite.is_persistent());
        assert!(StoreBackend::Sheet.is_persistent());
        assert!(!StoreBackend::Memory.is_persistent());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert!(config.store.database_path.is_none());
        assert_eq!(config.workflow.lock_timeout_ms, 5_000);
        assert_eq!(config.workflow.utc_offset_minutes, -180);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_lock_timeout() {
        let mut config = Config::default();
        config.workflow.lock_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lock_timeout_ms"));
    }

    #[test]
    fn test_validate_invalid_regex() {
        let mut config = Config::default();
        config.workflow.plate_pattern = "[A-Z".to_string();
        assert_matches!(config.validate(), Err(Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_validate_offset_out_of_range() {
        let mut config = Config::default();
        config.workflow.utc_offset_minutes = 15 * 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_plate_pattern() {
        let regex = Config::default().plate_regex().unwrap();
        assert!(regex.is_match("ABC-1234"));
        assert!(regex.is_match("ABC1D23"));
        assert!(!regex.is_match("abc-1234"));
        assert!(!regex.is_match("-ABC"));
        assert!(!regex.is_match("ABC 1234"));
    }

    #[test]
    fn test_utc_offset() {
        let offset = Config::default().utc_offset().unwrap();
        assert_eq!(offset.local_minus_utc(), -3 * 3600);
    }

    #[test]
    fn test_lock_timeout() {
        assert_eq!(Config::default().lock_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("fleetdesk"));
        assert!(path.to_string_lossy().ends_with("fleet.db"));
    }

    #[test]
    fn test_sheet_path_custom() {
        let mut config = Config::default();
        config.store.sheet_path = Some(PathBuf::from("/srv/fleet/book.json"));
        assert_eq!(config.sheet_path(), PathBuf::from("/srv/fleet/book.json"));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("fleetdesk"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config.workflow, WorkflowConfig::default());
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[store]
backend = "sheet"
sheet_path = "/tmp/fleet.json"

[workflow]
lock_timeout_ms = 250
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Sheet);
        assert_eq!(config.sheet_path(), PathBuf::from("/tmp/fleet.json"));
        assert_eq!(config.workflow.lock_timeout_ms, 250);
        assert_eq!(config.workflow.utc_offset_minutes, -180);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[workflow]\nlock_timeout_ms = 0\n").unwrap();

        assert_matches!(
            Config::load_from(Some(path)),
            Err(Error::ConfigValidation { .. })
        );
    }

    #[test]
    fn test_load_rejects_unknown_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store]\nbackend = \"postgres\"\n").unwrap();

        assert_matches!(Config::load_from(Some(path)), Err(Error::ConfigLoad(_)));
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(StoreBackend::Sheet.to_string(), "sheet");
        let json = serde_json::to_string(&StoreBackend::Memory).unwrap();
        assert_eq!(json, "\"memory\"");
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("lock_timeout_ms"));
        assert!(json.contains("plate_pattern"));
    }
}
