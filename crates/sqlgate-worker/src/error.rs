// crates/sqlgate-worker/src/error.rs
// ============================================================================
// Module: Worker Errors
// Description: Failures of the worker thread itself, not of individual calls.
// Purpose: Report spawn, runtime, and channel problems to the host.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Per-call failures travel to the host as error responses. The errors here
//! end the worker: it could not start, its runtime failed, or the host hung
//! up.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Worker thread errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The worker thread could not be spawned.
    #[error("worker spawn failed: {0}")]
    Spawn(String),
    /// The worker's async runtime failed.
    #[error("worker runtime error: {0}")]
    Runtime(String),
    /// A message channel closed unexpectedly.
    #[error("worker channel closed: {0}")]
    Channel(String),
    /// The worker configuration is invalid.
    #[error("worker config invalid: {0}")]
    Invalid(String),
}
