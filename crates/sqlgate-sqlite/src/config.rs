// crates/sqlgate-sqlite/src/config.rs
// ============================================================================
// Module: SQLite Driver Configuration
// Description: Database location and connection pragmas for the driver.
// Purpose: Open the single physical connection with validated settings.
// Dependencies: rusqlite, serde
// ============================================================================

//! ## Overview
//! [`SqliteDriverConfig`] names the database file (or `:memory:`) and the
//! pragmas applied when the driver opens its one connection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use serde::Deserialize;

use crate::error::DriverError;
use crate::error::db_error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Path that selects a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
    /// In-memory journal.
    Memory,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
            Self::Memory => "memory",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the single `SQLite` connection.
///
/// # Invariants
/// - `path` is either [`IN_MEMORY_PATH`] or a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteDriverConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Whether foreign key enforcement is enabled.
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default foreign key setting.
const fn default_foreign_keys() -> bool {
    true
}

impl SqliteDriverConfig {
    /// Builds a configuration for a database file with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
            foreign_keys: true,
        }
    }

    /// Builds a configuration for a private in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            journal_mode: SqliteJournalMode::Memory,
            ..Self::new(IN_MEMORY_PATH)
        }
    }

    /// Returns true when the configuration selects an in-memory database.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY_PATH
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Invalid`] when the path is unusable.
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.is_in_memory() {
            return Ok(());
        }
        validate_database_path(&self.path)
    }

    /// Opens the connection and applies the configured pragmas.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when validation, directory creation, opening, or
    /// a pragma fails.
    pub fn open(&self) -> Result<Connection, DriverError> {
        self.validate()?;
        if !self.is_in_memory() {
            ensure_parent_dir(&self.path)?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let connection = Connection::open_with_flags(&self.path, flags).map_err(db_error)?;
        apply_pragmas(&connection, self)?;
        Ok(connection)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the database exists.
fn ensure_parent_dir(path: &Path) -> Result<(), DriverError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|err| DriverError::Io(err.to_string()))
        }
        _ => Ok(()),
    }
}

/// Validates database paths for safety limits.
fn validate_database_path(path: &Path) -> Result<(), DriverError> {
    if path.as_os_str().is_empty() {
        return Err(DriverError::Invalid("database path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(DriverError::Invalid("database path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(DriverError::Invalid(
                "database path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(DriverError::Invalid(
            "database path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Applies the configured `SQLite` pragmas.
fn apply_pragmas(connection: &Connection, config: &SqliteDriverConfig) -> Result<(), DriverError> {
    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    connection
        .execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_error)?;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
