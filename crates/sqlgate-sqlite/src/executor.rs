// crates/sqlgate-sqlite/src/executor.rs
// ============================================================================
// Module: Statement Executor
// Description: Synchronous statement execution over one SQLite handle.
// Purpose: Run compiled queries and stream reader results from a cursor.
// Dependencies: rusqlite, sqlgate-core
// ============================================================================

//! ## Overview
//! [`SqliteExecutor`] owns the physical connection. Every call prepares a
//! fresh statement and finalizes it before returning, on success and on
//! error. Reader versus writer is decided by introspection: a statement that
//! produces columns is a reader.
//!
//! Streaming returns a [`RowStream`] that owns its prepared statement; the
//! statement lives until the stream is dropped, whether the consumer drained
//! it, stopped early, or hit an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use rusqlite::Connection;
use rusqlite::Rows;
use rusqlite::Statement;
use rusqlite::types::Value as SqliteValue;
use rusqlite::types::ValueRef;
use sqlgate_core::CompiledQuery;
use sqlgate_core::ExecutionResult;
use sqlgate_core::QueryKind;
use sqlgate_core::Row;
use sqlgate_core::Value;

use crate::error::DriverError;
use crate::error::db_error;

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Synchronous executor bound to one physical connection.
///
/// # Invariants
/// - Prepared statements never outlive the call (or stream) that created them.
/// - After [`SqliteExecutor::close`] every operation fails with
///   [`DriverError::Destroyed`].
pub struct SqliteExecutor {
    /// Physical connection; `None` once closed.
    connection: Option<Connection>,
}

impl SqliteExecutor {
    /// Wraps an open connection.
    #[must_use]
    pub const fn new(connection: Connection) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    /// Returns the open connection.
    fn connection(&self) -> Result<&Connection, DriverError> {
        self.connection.as_ref().ok_or(DriverError::Destroyed)
    }

    /// Returns true once the connection has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    /// Returns true when no transaction is open.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Destroyed`] after close.
    pub fn is_autocommit(&self) -> Result<bool, DriverError> {
        Ok(self.connection()?.is_autocommit())
    }

    /// Executes a query to completion.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the statement cannot be prepared, bound, or
    /// executed.
    pub fn execute(&self, query: &CompiledQuery) -> Result<ExecutionResult, DriverError> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(&query.sql).map_err(db_error)?;
        bind_parameters(&mut statement, &query.parameters)?;
        if statement.column_count() > 0 {
            let columns = column_names(&statement);
            let mut rows = statement.raw_query();
            let mut collected = Vec::new();
            while let Some(row) = rows.next().map_err(db_error)? {
                collected.push(Row::new(Arc::clone(&columns), read_row(row, columns.len())?));
            }
            return Ok(ExecutionResult::Rows {
                rows: collected,
            });
        }
        let rowid_before = connection.last_insert_rowid();
        let changes = statement.raw_execute().map_err(db_error)?;
        let rowid_after = connection.last_insert_rowid();
        // The rowid only moves when a rowid table received a new row.
        let insert_id = match query.kind {
            QueryKind::Insert | QueryKind::Raw => {
                (changes > 0 && rowid_after != rowid_before).then_some(rowid_after)
            }
            QueryKind::Select | QueryKind::Update | QueryKind::Delete => None,
        };
        Ok(ExecutionResult::Mutation {
            rows_affected: u64::try_from(changes).unwrap_or(u64::MAX),
            insert_id,
        })
    }

    /// Opens a lazy row stream for a reader query.
    ///
    /// Writer kinds are rejected before anything is prepared. Raw queries are
    /// prepared and accepted only when the statement is read-only.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::UnsupportedStreamKind`] for non-reader queries and
    /// [`DriverError`] when preparation or binding fails.
    pub fn stream(
        &self,
        query: &CompiledQuery,
        chunk_size: usize,
    ) -> Result<RowStream<'_>, DriverError> {
        if query.kind.is_write() {
            return Err(DriverError::UnsupportedStreamKind(query.kind));
        }
        let connection = self.connection()?;
        let mut statement = connection.prepare(&query.sql).map_err(db_error)?;
        if query.kind == QueryKind::Raw && !(statement.readonly() && statement.column_count() > 0)
        {
            return Err(DriverError::UnsupportedStreamKind(query.kind));
        }
        bind_parameters(&mut statement, &query.parameters)?;
        let columns = column_names(&statement);
        Ok(RowStream {
            statement,
            columns,
            chunk_size: chunk_size.max(1),
            consumed: false,
        })
    }

    /// Closes the physical connection.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Db`] when the engine refuses to close; the
    /// handle is dropped regardless.
    pub fn close(&mut self) -> Result<(), DriverError> {
        match self.connection.take() {
            Some(connection) => connection.close().map_err(|(_, err)| db_error(err)),
            None => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Streaming
// ============================================================================

/// Prepared reader statement awaiting iteration.
pub struct RowStream<'conn> {
    /// Prepared statement with parameters bound.
    statement: Statement<'conn>,
    /// Column names shared by every produced row.
    columns: Arc<[String]>,
    /// Maximum rows per produced chunk.
    chunk_size: usize,
    /// Whether iteration has started; streams are not restartable.
    consumed: bool,
}

impl RowStream<'_> {
    /// Returns the result column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Starts pulling rows from the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Invalid`] when called a second time.
    pub fn chunks(&mut self) -> Result<RowChunks<'_>, DriverError> {
        if self.consumed {
            return Err(DriverError::Invalid("row stream already consumed".to_string()));
        }
        self.consumed = true;
        Ok(RowChunks {
            rows: self.statement.raw_query(),
            columns: Arc::clone(&self.columns),
            chunk_size: self.chunk_size,
            finished: false,
        })
    }
}

/// Iterator of row chunks pulled lazily from one open cursor.
pub struct RowChunks<'stmt> {
    /// Open cursor.
    rows: Rows<'stmt>,
    /// Column names shared by every produced row.
    columns: Arc<[String]>,
    /// Maximum rows per produced chunk.
    chunk_size: usize,
    /// Set once the cursor is exhausted or failed.
    finished: bool,
}

impl Iterator for RowChunks<'_> {
    type Item = Result<ExecutionResult, DriverError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let mut batch = Vec::with_capacity(self.chunk_size);
        while batch.len() < self.chunk_size {
            match self.rows.next() {
                Ok(Some(row)) => match read_row(row, self.columns.len()) {
                    Ok(values) => batch.push(Row::new(Arc::clone(&self.columns), values)),
                    Err(err) => {
                        self.finished = true;
                        return Some(Err(err));
                    }
                },
                Ok(None) => {
                    self.finished = true;
                    break;
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(db_error(err)));
                }
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(Ok(ExecutionResult::Rows {
                rows: batch,
            }))
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Binds positional parameters, rejecting count mismatches and documents.
fn bind_parameters(statement: &mut Statement<'_>, parameters: &[Value]) -> Result<(), DriverError> {
    let expected = statement.parameter_count();
    if expected != parameters.len() {
        return Err(DriverError::InvalidParameter(format!(
            "statement expects {expected} parameters, got {}",
            parameters.len()
        )));
    }
    for (index, parameter) in parameters.iter().enumerate() {
        let value = to_sqlite_value(parameter, index)?;
        statement.raw_bind_parameter(index + 1, value).map_err(db_error)?;
    }
    Ok(())
}

/// Converts a parameter into an engine value.
fn to_sqlite_value(value: &Value, index: usize) -> Result<SqliteValue, DriverError> {
    Ok(match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(flag) => SqliteValue::Integer(i64::from(*flag)),
        Value::Integer(number) => SqliteValue::Integer(*number),
        Value::Real(number) => SqliteValue::Real(*number),
        Value::Text(text) => SqliteValue::Text(text.clone()),
        Value::Blob(bytes) => SqliteValue::Blob(bytes.clone()),
        Value::Json(_) => {
            return Err(DriverError::InvalidParameter(format!(
                "parameter {} is a structured value; encode it before binding",
                index + 1
            )));
        }
    })
}

/// Collects the statement's column names.
fn column_names(statement: &Statement<'_>) -> Arc<[String]> {
    statement.column_names().into_iter().map(str::to_string).collect()
}

/// Reads one row into owned values.
fn read_row(row: &rusqlite::Row<'_>, width: usize) -> Result<Vec<Value>, DriverError> {
    let mut values = Vec::with_capacity(width);
    for index in 0 .. width {
        let value = match row.get_ref(index).map_err(db_error)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(number) => Value::Integer(number),
            ValueRef::Real(number) => Value::Real(number),
            ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => Value::Text(text.to_string()),
                // Engine text is not validated; keep the exact bytes.
                Err(_) => Value::Blob(bytes.to_vec()),
            },
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        };
        values.push(value);
    }
    Ok(values)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
