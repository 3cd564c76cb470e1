// crates/sqlgate-sqlite/src/connection.rs
// ============================================================================
// Module: Driver Connection
// Description: Exclusive handle on the single SQLite connection.
// Purpose: Run plugin-wrapped queries and streams while the gate is held.
// Dependencies: tokio-stream, sqlgate-core, crate::{executor, gate}
// ============================================================================

//! ## Overview
//! A [`SqliteConnection`] is what [`crate::SqliteDriver::acquire_connection`]
//! hands out. It owns the gate guard, so holding it is holding the database.
//! Queries pass through the configured plugins on the way in and results (and
//! each streamed chunk) pass back through them on the way out.
//!
//! Dropping a connection releases the gate. A transaction still open at that
//! point is rolled back first so the next holder never inherits it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Instant;

use async_trait::async_trait;
use sqlgate_core::CompiledQuery;
use sqlgate_core::EventSink;
use sqlgate_core::ExecutionResult;
use sqlgate_core::QueryPlugin;
use sqlgate_core::TelemetryEvent;
use sqlgate_core::apply_query_plugins;
use sqlgate_core::apply_result_plugins;
use tokio_stream::Stream;

use crate::error::DriverError;
use crate::executor::RowChunks;
use crate::executor::RowStream;
use crate::executor::SqliteExecutor;
use crate::gate::GateGuard;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Telemetry component label.
pub(crate) const COMPONENT: &str = "sqlite_driver";

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Connection contract shared by driver backends.
#[async_trait]
pub trait DatabaseConnection: Send {
    /// Executes a compiled query to completion.
    async fn execute_query(&mut self, query: &CompiledQuery)
    -> Result<ExecutionResult, DriverError>;
}

// ============================================================================
// SECTION: Connection
// ============================================================================

/// Exclusive, plugin-aware handle on the driver's connection.
pub struct SqliteConnection {
    /// Gate guard over the executor.
    executor: GateGuard<SqliteExecutor>,
    /// Plugins applied in configuration order.
    plugins: Arc<[Arc<dyn QueryPlugin>]>,
    /// Telemetry sink.
    sink: Arc<dyn EventSink>,
    /// When the gate was granted.
    acquired_at: Instant,
}

impl SqliteConnection {
    /// Wraps a freshly granted gate guard.
    pub(crate) fn new(
        executor: GateGuard<SqliteExecutor>,
        plugins: Arc<[Arc<dyn QueryPlugin>]>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            executor,
            plugins,
            sink,
            acquired_at: Instant::now(),
        }
    }

    /// Executes a query synchronously on the held connection.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] from preparation, binding, or execution.
    pub fn execute(&mut self, query: &CompiledQuery) -> Result<ExecutionResult, DriverError> {
        let query = apply_query_plugins(&self.plugins, query.clone());
        match self.executor.execute(&query) {
            Ok(result) => Ok(apply_result_plugins(&self.plugins, result)),
            Err(err) => {
                record_failure(self.sink.as_ref(), &query, &err);
                Err(err)
            }
        }
    }

    /// Opens a lazy stream over a reader query.
    ///
    /// Rows are produced in chunks of at most `chunk_size` (minimum one). The
    /// connection stays borrowed, and the gate held, until the stream drops.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::UnsupportedStreamKind`] for writer queries and
    /// [`DriverError`] when preparation or binding fails.
    pub fn stream_query(
        &mut self,
        query: &CompiledQuery,
        chunk_size: usize,
    ) -> Result<QueryStream<'_>, DriverError> {
        let query = apply_query_plugins(&self.plugins, query.clone());
        match self.executor.stream(&query, chunk_size) {
            Ok(rows) => Ok(QueryStream {
                rows,
                plugins: &self.plugins,
            }),
            Err(err) => {
                record_failure(self.sink.as_ref(), &query, &err);
                Err(err)
            }
        }
    }

    /// Returns true while a transaction is open on this connection.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Destroyed`] when the connection was closed.
    pub fn in_transaction(&self) -> Result<bool, DriverError> {
        Ok(!self.executor.is_autocommit()?)
    }

    /// Returns how long this handle has held the gate.
    #[must_use]
    pub fn held_for(&self) -> std::time::Duration {
        self.acquired_at.elapsed()
    }

    /// Returns true when the underlying connection was closed by `destroy`.
    pub(crate) fn is_closed(&self) -> bool {
        self.executor.is_closed()
    }
}

#[async_trait]
impl DatabaseConnection for SqliteConnection {
    async fn execute_query(
        &mut self,
        query: &CompiledQuery,
    ) -> Result<ExecutionResult, DriverError> {
        self.execute(query)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if !matches!(self.executor.is_autocommit(), Ok(false)) {
            return;
        }
        let outcome = self.executor.execute(&CompiledQuery::raw("rollback"));
        let mut event = TelemetryEvent::new(COMPONENT, "transaction_abandoned");
        if let Err(err) = outcome {
            event = event.with_message(err.to_string());
        }
        self.sink.record(&event);
    }
}

/// Records a failed statement without its parameter values.
fn record_failure(sink: &dyn EventSink, query: &CompiledQuery, err: &DriverError) {
    sink.record(
        &TelemetryEvent::new(COMPONENT, "query_failed")
            .with_sql(query.sql.clone(), query.parameters.len())
            .with_message(err.to_string()),
    );
}

// ============================================================================
// SECTION: Streaming
// ============================================================================

/// Prepared streaming query on a held connection.
pub struct QueryStream<'conn> {
    /// Prepared reader statement.
    rows: RowStream<'conn>,
    /// Plugins applied to each chunk.
    plugins: &'conn [Arc<dyn QueryPlugin>],
}

impl QueryStream<'_> {
    /// Returns the result column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        self.rows.columns()
    }

    /// Starts pulling chunks from the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Invalid`] when called a second time.
    pub fn chunks(&mut self) -> Result<QueryChunks<'_>, DriverError> {
        let plugins = self.plugins;
        Ok(QueryChunks {
            inner: self.rows.chunks()?,
            plugins,
        })
    }
}

/// Plugin-transformed chunks, usable as an [`Iterator`] or a [`Stream`].
///
/// Breaking out of iteration early is safe: the cursor is finalized when the
/// owning [`QueryStream`] drops.
pub struct QueryChunks<'stmt> {
    /// Raw chunk iterator.
    inner: RowChunks<'stmt>,
    /// Plugins applied to each chunk.
    plugins: &'stmt [Arc<dyn QueryPlugin>],
}

impl Iterator for QueryChunks<'_> {
    type Item = Result<ExecutionResult, DriverError>;

    fn next(&mut self) -> Option<Self::Item> {
        let plugins = self.plugins;
        self.inner.next().map(|chunk| chunk.map(|result| apply_result_plugins(plugins, result)))
    }
}

impl Stream for QueryChunks<'_> {
    type Item = Result<ExecutionResult, DriverError>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().next())
    }
}
