// crates/sqlgate-sqlite/src/error.rs
// ============================================================================
// Module: Driver Errors
// Description: Error taxonomy for the single-connection SQLite driver.
// Purpose: Separate usage-order errors from engine failures.
// Dependencies: rusqlite, thiserror, sqlgate-core
// ============================================================================

//! ## Overview
//! Usage-order errors ([`DriverError::NotInitialized`],
//! [`DriverError::Destroyed`]) fail the offending call only. Engine failures are
//! surfaced unchanged as [`DriverError::Db`]; nothing is retried or swallowed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sqlgate_core::QueryKind;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Driver errors.
///
/// # Invariants
/// - Error messages never embed parameter values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// An operation was attempted before `init`.
    #[error("sqlite driver not initialized")]
    NotInitialized,
    /// An operation was attempted after `destroy`.
    #[error("sqlite driver destroyed")]
    Destroyed,
    /// Streaming was requested for a query that is not a reader.
    #[error("sqlite driver only supports streaming of select queries (got {0})")]
    UnsupportedStreamKind(QueryKind),
    /// A parameter cannot be bound by the engine.
    #[error("sqlite driver invalid parameter: {0}")]
    InvalidParameter(String),
    /// `SQLite` engine error.
    #[error("sqlite driver db error: {0}")]
    Db(String),
    /// I/O error while preparing the database location.
    #[error("sqlite driver io error: {0}")]
    Io(String),
    /// Invalid configuration or API misuse.
    #[error("sqlite driver invalid: {0}")]
    Invalid(String),
    /// The `on_create_connection` hook failed.
    #[error("sqlite driver connection hook failed: {0}")]
    Hook(String),
}

/// Maps an engine error onto [`DriverError::Db`].
#[allow(clippy::needless_pass_by_value, reason = "Used directly as a map_err adapter.")]
pub(crate) fn db_error(err: rusqlite::Error) -> DriverError {
    DriverError::Db(err.to_string())
}
