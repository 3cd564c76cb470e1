// crates/sqlgate-worker/src/database.rs
// ============================================================================
// Module: Database Handlers
// Description: Worker handlers backed by the single-connection driver.
// Purpose: Let a host run queries and transactions through a worker.
// Dependencies: sqlgate-core, sqlgate-sqlite, crate::handler
// ============================================================================

//! ## Overview
//! Registers two handlers against a shared [`SqliteDriver`]:
//! - `db.execute` with args `[query]` returns one execution result.
//! - `db.transaction` with args `[[query, ..]]` runs every query in one
//!   transaction and returns the results in order; any failure rolls the
//!   whole batch back.
//!
//! The driver must be initialized by the host before calls arrive.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use sqlgate_core::CompiledQuery;
use sqlgate_core::ExecutionResult;
use sqlgate_sqlite::DriverError;
use sqlgate_sqlite::SqliteConnection;
use sqlgate_sqlite::SqliteDriver;

use crate::handler::HandlerError;
use crate::handler::HandlerTableBuilder;
use crate::handler::typed_handler;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Handler name for single queries.
pub const EXECUTE_HANDLER: &str = "db.execute";
/// Handler name for transactional batches.
pub const TRANSACTION_HANDLER: &str = "db.transaction";

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Adds the database handlers to `builder`.
#[must_use]
pub fn register_database_handlers(
    builder: HandlerTableBuilder,
    driver: Arc<SqliteDriver>,
) -> HandlerTableBuilder {
    let execute_driver = Arc::clone(&driver);
    builder
        .register(
            EXECUTE_HANDLER,
            typed_handler(move |(query,): (CompiledQuery,)| {
                let driver = Arc::clone(&execute_driver);
                async move { driver.execute(&query).await.map_err(HandlerError::from) }
            }),
        )
        .register(
            TRANSACTION_HANDLER,
            typed_handler(move |(queries,): (Vec<CompiledQuery>,)| {
                let driver = Arc::clone(&driver);
                async move {
                    driver
                        .with_transaction(|connection| run_batch(connection, &queries))
                        .await
                        .map_err(HandlerError::from)
                }
            }),
        )
}

/// Executes `queries` in order, stopping at the first failure.
fn run_batch(
    connection: &mut SqliteConnection,
    queries: &[CompiledQuery],
) -> Result<Vec<ExecutionResult>, DriverError> {
    queries.iter().map(|query| connection.execute(query)).collect()
}
