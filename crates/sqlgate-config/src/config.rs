// crates/sqlgate-config/src/config.rs
// ============================================================================
// Module: sqlgate Configuration
// Description: Configuration loading and validation for sqlgate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: sqlgate-core, sqlgate-sqlite, sqlgate-worker, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has defaults, so an empty file yields an in-memory database,
//! a default worker, and no telemetry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use sqlgate_core::EventSink;
use sqlgate_core::FileEventSink;
use sqlgate_core::NoopEventSink;
use sqlgate_core::StderrEventSink;
use sqlgate_sqlite::SqliteDriver;
use sqlgate_sqlite::SqliteDriverBuilder;
use sqlgate_sqlite::SqliteDriverConfig;
use sqlgate_worker::WorkerConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "sqlgate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SQLGATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Top-level sqlgate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqlGateConfig {
    /// Database connection settings.
    #[serde(default = "SqliteDriverConfig::in_memory")]
    pub database: SqliteDriverConfig,
    /// Whether structured values are stored as JSON text.
    #[serde(default = "default_json_values")]
    pub json_values: bool,
    /// Worker thread settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Telemetry sink settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Returns the default JSON value codec setting.
const fn default_json_values() -> bool {
    true
}

impl Default for SqlGateConfig {
    fn default() -> Self {
        Self {
            database: SqliteDriverConfig::in_memory(),
            json_values: true,
            worker: WorkerConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl SqlGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate().map_err(|err| ConfigError::Invalid(err.to_string()))?;
        self.worker.validate().map_err(|err| ConfigError::Invalid(err.to_string()))?;
        self.telemetry.validate()
    }

    /// Returns a driver builder wired with the configured database, codec, and
    /// telemetry sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the telemetry file cannot be opened.
    pub fn driver_builder(&self) -> Result<SqliteDriverBuilder, ConfigError> {
        let builder =
            SqliteDriver::builder(self.database.clone()).event_sink(self.telemetry.build_sink()?);
        Ok(if self.json_values { builder.json_values() } else { builder })
    }
}

/// Telemetry destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TelemetrySinkKind {
    /// Discard events.
    #[default]
    None,
    /// JSON lines on stderr.
    Stderr,
    /// JSON lines appended to `path`.
    File,
}

/// Telemetry configuration.
///
/// # Invariants
/// - `path` is set exactly when `sink` is [`TelemetrySinkKind::File`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct TelemetryConfig {
    /// Sink selection.
    #[serde(default)]
    pub sink: TelemetrySinkKind,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl TelemetryConfig {
    /// Validates sink and path pairing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a missing or unexpected path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (TelemetrySinkKind::File, None) => {
                Err(ConfigError::Invalid("file telemetry sink requires path".to_string()))
            }
            (TelemetrySinkKind::File, Some(path)) => validate_path_string(
                "telemetry.path",
                &path.to_string_lossy(),
            ),
            (TelemetrySinkKind::None | TelemetrySinkKind::Stderr, Some(_)) => Err(
                ConfigError::Invalid("telemetry path is only valid for the file sink".to_string()),
            ),
            (TelemetrySinkKind::None | TelemetrySinkKind::Stderr, None) => Ok(()),
        }
    }

    /// Builds the configured sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file sink cannot be opened.
    pub fn build_sink(&self) -> Result<Arc<dyn EventSink>, ConfigError> {
        self.validate()?;
        let sink: Arc<dyn EventSink> = match (self.sink, &self.path) {
            (TelemetrySinkKind::File, Some(path)) => Arc::new(
                FileEventSink::new(path).map_err(|err| ConfigError::Io(err.to_string()))?,
            ),
            (TelemetrySinkKind::Stderr, _) => Arc::new(StderrEventSink),
            _ => Arc::new(NoopEventSink),
        };
        Ok(sink)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller, the environment, or the default.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path string.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    validate_path(Path::new(value))
        .map_err(|_| ConfigError::Invalid(format!("{field} exceeds path limits")))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::MAX_PATH_COMPONENT_LENGTH;
    use super::MAX_TOTAL_PATH_LENGTH;
    use super::validate_path_string;

    #[test]
    fn path_string_rejects_blank_values() {
        let result = validate_path_string("telemetry.path", "   ");
        assert!(result.is_err_and(|err| err.to_string().contains("non-empty")));
    }

    #[test]
    fn path_string_rejects_long_components() {
        let path = format!("./{}", "a".repeat(MAX_PATH_COMPONENT_LENGTH + 1));
        assert!(validate_path_string("telemetry.path", &path).is_err());
        let path = format!("./{}", "a".repeat(MAX_PATH_COMPONENT_LENGTH));
        assert!(validate_path_string("telemetry.path", &path).is_ok());
    }

    #[test]
    fn path_string_rejects_long_paths() {
        let path = "a/".repeat(MAX_TOTAL_PATH_LENGTH / 2 + 1);
        assert!(validate_path_string("telemetry.path", &path).is_err());
    }
}
