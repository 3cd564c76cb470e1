// crates/sqlgate-sqlite/src/driver.rs
// ============================================================================
// Module: SQLite Driver Lifecycle
// Description: Init, acquire, release, transactions, and destroy.
// Purpose: Own the single connection and its gate for the driver's lifetime.
// Dependencies: async-trait, tokio, sqlgate-core, crate::{config, connection}
// ============================================================================

//! ## Overview
//! [`SqliteDriver`] moves through three states: uninitialized, ready, and
//! destroyed. `init` opens the one physical connection (from a configuration
//! or a caller factory), runs the optional `on_create_connection` hook, and
//! installs the [`ConnectionGate`]. Every connection handed out afterwards is
//! the same physical connection; the gate makes callers take turns.
//!
//! # Invariants
//! - At most one [`SqliteConnection`] exists at any instant.
//! - `init` is idempotent; `destroy` is idempotent and terminal.
//! - `destroy` waits for the current holder to release before closing.
//! - Acquiring a second connection from a task that already holds one waits
//!   forever; transactions must use the connection they were begun on.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use rusqlite::Connection;
use sqlgate_core::CompiledQuery;
use sqlgate_core::EventSink;
use sqlgate_core::ExecutionResult;
use sqlgate_core::JsonValuePlugin;
use sqlgate_core::NoopEventSink;
use sqlgate_core::QueryPlugin;
use sqlgate_core::TelemetryEvent;

use crate::config::SqliteDriverConfig;
use crate::connection::COMPONENT;
use crate::connection::DatabaseConnection;
use crate::connection::SqliteConnection;
use crate::error::DriverError;
use crate::executor::SqliteExecutor;
use crate::gate::ConnectionGate;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Lifecycle contract shared by driver backends.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Connection handle type.
    type Connection: DatabaseConnection + Send;

    /// Opens the underlying connection.
    async fn init(&self) -> Result<(), DriverError>;

    /// Waits for exclusive use of the connection.
    async fn acquire_connection(&self) -> Result<Self::Connection, DriverError>;

    /// Returns the connection to the gate.
    async fn release_connection(&self, connection: Self::Connection) -> Result<(), DriverError>;

    /// Starts a transaction on `connection`.
    async fn begin_transaction(&self, connection: &mut Self::Connection)
    -> Result<(), DriverError>;

    /// Commits the transaction open on `connection`.
    async fn commit_transaction(
        &self,
        connection: &mut Self::Connection,
    ) -> Result<(), DriverError>;

    /// Rolls back the transaction open on `connection`.
    async fn rollback_transaction(
        &self,
        connection: &mut Self::Connection,
    ) -> Result<(), DriverError>;

    /// Closes the underlying connection.
    async fn destroy(&self) -> Result<(), DriverError>;
}

// ============================================================================
// SECTION: Sources and Hooks
// ============================================================================

/// Factory producing the physical connection.
pub type ConnectionFactory = Arc<dyn Fn() -> Result<Connection, DriverError> + Send + Sync>;

/// Hook run once against the freshly opened connection.
pub type ConnectionHook =
    Arc<dyn Fn(&mut SqliteConnection) -> Result<(), DriverError> + Send + Sync>;

/// Where the driver's connection comes from.
#[derive(Clone)]
pub enum DatabaseSource {
    /// Open a database from configuration.
    Config(SqliteDriverConfig),
    /// Call a factory supplied by the caller.
    Factory(ConnectionFactory),
}

impl DatabaseSource {
    /// Wraps a connection factory.
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Connection, DriverError> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(factory))
    }

    /// Produces the physical connection.
    fn open(&self) -> Result<Connection, DriverError> {
        match self {
            Self::Config(config) => config.open(),
            Self::Factory(factory) => factory(),
        }
    }
}

impl From<SqliteDriverConfig> for DatabaseSource {
    fn from(config: SqliteDriverConfig) -> Self {
        Self::Config(config)
    }
}

impl fmt::Debug for DatabaseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(config) => f.debug_tuple("Config").field(config).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for [`SqliteDriver`].
pub struct SqliteDriverBuilder {
    /// Connection source.
    source: DatabaseSource,
    /// Plugins in configuration order.
    plugins: Vec<Arc<dyn QueryPlugin>>,
    /// Optional creation hook.
    on_create_connection: Option<ConnectionHook>,
    /// Telemetry sink.
    sink: Arc<dyn EventSink>,
}

impl SqliteDriverBuilder {
    /// Appends a plugin; plugins run in the order they were added.
    #[must_use]
    pub fn plugin(mut self, plugin: Arc<dyn QueryPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Appends the JSON value codec plugin.
    #[must_use]
    pub fn json_values(self) -> Self {
        self.plugin(Arc::new(JsonValuePlugin::new()))
    }

    /// Installs a hook run once after the connection opens.
    #[must_use]
    pub fn on_create_connection<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut SqliteConnection) -> Result<(), DriverError> + Send + Sync + 'static,
    {
        self.on_create_connection = Some(Arc::new(hook));
        self
    }

    /// Routes telemetry events to `sink`.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Builds an uninitialized driver.
    #[must_use]
    pub fn build(self) -> SqliteDriver {
        SqliteDriver {
            source: self.source,
            plugins: self.plugins.into(),
            on_create_connection: self.on_create_connection,
            sink: self.sink,
            state: Mutex::new(DriverState::Uninitialized),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// Lifecycle state.
enum DriverState {
    /// `init` has not completed.
    Uninitialized,
    /// Connection open behind its gate.
    Ready(Arc<ConnectionGate<SqliteExecutor>>),
    /// `destroy` has run; terminal.
    Destroyed,
}

/// Single-connection `SQLite` driver.
pub struct SqliteDriver {
    /// Connection source.
    source: DatabaseSource,
    /// Plugins in configuration order.
    plugins: Arc<[Arc<dyn QueryPlugin>]>,
    /// Optional creation hook.
    on_create_connection: Option<ConnectionHook>,
    /// Telemetry sink.
    sink: Arc<dyn EventSink>,
    /// Current lifecycle state; never held across an await.
    state: Mutex<DriverState>,
    /// Serializes `init` and `destroy`.
    lifecycle: tokio::sync::Mutex<()>,
}

impl SqliteDriver {
    /// Starts building a driver for `source`.
    #[must_use]
    pub fn builder(source: impl Into<DatabaseSource>) -> SqliteDriverBuilder {
        SqliteDriverBuilder {
            source: source.into(),
            plugins: Vec::new(),
            on_create_connection: None,
            sink: Arc::new(NoopEventSink),
        }
    }

    /// Builds a driver with no plugins, hook, or telemetry.
    #[must_use]
    pub fn new(source: impl Into<DatabaseSource>) -> Self {
        Self::builder(source).build()
    }

    /// Returns true once `init` has succeeded and `destroy` has not run.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready_gate().is_ok()
    }

    /// Returns true once `destroy` has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state.lock().is_ok_and(|state| matches!(*state, DriverState::Destroyed))
    }

    /// Returns the gate when the driver is ready.
    fn ready_gate(&self) -> Result<Arc<ConnectionGate<SqliteExecutor>>, DriverError> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        match &*state {
            DriverState::Uninitialized => Err(DriverError::NotInitialized),
            DriverState::Ready(gate) => Ok(Arc::clone(gate)),
            DriverState::Destroyed => Err(DriverError::Destroyed),
        }
    }

    /// Emits a telemetry event.
    fn record(&self, event: &TelemetryEvent) {
        self.sink.record(event);
    }

    /// Opens the connection, runs the hook, and builds the gate.
    fn open_gate(&self) -> Result<ConnectionGate<SqliteExecutor>, DriverError> {
        let gate = ConnectionGate::new(SqliteExecutor::new(self.source.open()?));
        if let Some(hook) = &self.on_create_connection {
            let guard = gate
                .try_acquire()
                .ok_or_else(|| DriverError::Invalid("fresh gate was not free".to_string()))?;
            let mut connection =
                SqliteConnection::new(guard, Arc::clone(&self.plugins), Arc::clone(&self.sink));
            hook(&mut connection)?;
        }
        Ok(gate)
    }

    /// Runs `f` with an exclusive connection, releasing it on every path.
    ///
    /// # Errors
    ///
    /// Returns the acquire error or whatever `f` returns.
    pub async fn with_connection<F, R>(&self, f: F) -> Result<R, DriverError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<R, DriverError> + Send,
        R: Send,
    {
        let mut connection = self.acquire_connection().await?;
        let result = f(&mut connection);
        self.release_connection(connection).await?;
        result
    }

    /// Runs `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// # Errors
    ///
    /// Returns lifecycle, begin, or commit errors, or the error `f` returned.
    pub async fn with_transaction<F, R>(&self, f: F) -> Result<R, DriverError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<R, DriverError> + Send,
        R: Send,
    {
        let mut connection = self.acquire_connection().await?;
        if let Err(err) = self.begin_transaction(&mut connection).await {
            self.release_connection(connection).await?;
            return Err(err);
        }
        let outcome = match f(&mut connection) {
            Ok(value) => self.commit_transaction(&mut connection).await.map(|()| value),
            Err(err) => {
                // The caller's error wins over a failed rollback.
                let _ = self.rollback_transaction(&mut connection).await;
                Err(err)
            }
        };
        self.release_connection(connection).await?;
        outcome
    }

    /// Executes one query on a briefly held connection.
    ///
    /// # Errors
    ///
    /// Returns lifecycle or execution errors.
    pub async fn execute(&self, query: &CompiledQuery) -> Result<ExecutionResult, DriverError> {
        self.with_connection(|connection| connection.execute(query)).await
    }

    /// Runs one transaction-control statement and records it.
    ///
    /// A holder keeps control of its transaction until it releases, even
    /// when `destroy` is already waiting behind it.
    fn control(
        &self,
        connection: &mut SqliteConnection,
        sql: &str,
        event: &'static str,
    ) -> Result<(), DriverError> {
        if connection.is_closed() {
            return Err(DriverError::Destroyed);
        }
        connection.execute(&CompiledQuery::raw(sql))?;
        self.record(&TelemetryEvent::new(COMPONENT, event));
        Ok(())
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    async fn init(&self) -> Result<(), DriverError> {
        let _lifecycle = self.lifecycle.lock().await;
        match self.ready_gate() {
            Ok(_) => return Ok(()),
            Err(DriverError::NotInitialized) => {}
            Err(err) => return Err(err),
        }
        let gate = self.open_gate()?;
        {
            let mut state = self.state.lock().map_err(|_| poisoned())?;
            *state = DriverState::Ready(Arc::new(gate));
        }
        self.record(&TelemetryEvent::new(COMPONENT, "driver_init"));
        Ok(())
    }

    async fn acquire_connection(&self) -> Result<SqliteConnection, DriverError> {
        let gate = self.ready_gate()?;
        let started = Instant::now();
        let guard = gate.acquire().await;
        if guard.is_closed() {
            return Err(DriverError::Destroyed);
        }
        let wait_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.record(&TelemetryEvent::new(COMPONENT, "connection_acquired").with_wait_us(wait_us));
        Ok(SqliteConnection::new(guard, Arc::clone(&self.plugins), Arc::clone(&self.sink)))
    }

    async fn release_connection(&self, connection: SqliteConnection) -> Result<(), DriverError> {
        let closed = connection.is_closed();
        drop(connection);
        if !closed {
            self.record(&TelemetryEvent::new(COMPONENT, "connection_released"));
        }
        Ok(())
    }

    async fn begin_transaction(&self, connection: &mut SqliteConnection) -> Result<(), DriverError> {
        self.control(connection, "begin", "transaction_begin")
    }

    async fn commit_transaction(
        &self,
        connection: &mut SqliteConnection,
    ) -> Result<(), DriverError> {
        self.control(connection, "commit", "transaction_commit")
    }

    async fn rollback_transaction(
        &self,
        connection: &mut SqliteConnection,
    ) -> Result<(), DriverError> {
        self.control(connection, "rollback", "transaction_rollback")
    }

    async fn destroy(&self) -> Result<(), DriverError> {
        let _lifecycle = self.lifecycle.lock().await;
        let previous = {
            let mut state = self.state.lock().map_err(|_| poisoned())?;
            std::mem::replace(&mut *state, DriverState::Destroyed)
        };
        let DriverState::Ready(gate) = previous else {
            return Ok(());
        };
        let mut executor = gate.acquire().await;
        let closed = executor.close();
        executor.release();
        self.record(&TelemetryEvent::new(COMPONENT, "driver_destroy"));
        closed
    }
}

/// Error for a poisoned state lock.
fn poisoned() -> DriverError {
    DriverError::Invalid("driver state lock poisoned".to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use sqlgate_core::CompiledQuery;
    use sqlgate_core::MemoryEventSink;

    use super::DatabaseSource;
    use super::Driver;
    use super::SqliteDriver;
    use crate::config::SqliteDriverConfig;
    use crate::error::DriverError;

    #[tokio::test]
    async fn operations_before_init_fail() {
        let driver = SqliteDriver::new(SqliteDriverConfig::in_memory());
        assert!(!driver.is_ready());
        assert_eq!(driver.acquire_connection().await.err(), Some(DriverError::NotInitialized));
    }

    #[tokio::test]
    async fn init_twice_opens_once() {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opened);
        let driver = SqliteDriver::new(DatabaseSource::factory(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            rusqlite::Connection::open_in_memory().map_err(crate::error::db_error)
        }));
        driver.init().await.unwrap();
        driver.init().await.unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert!(driver.is_ready());
    }

    #[tokio::test]
    async fn factory_errors_leave_driver_uninitialized() {
        let driver = SqliteDriver::new(DatabaseSource::factory(|| {
            Err(DriverError::Io("disk unavailable".to_string()))
        }));
        assert_eq!(driver.init().await, Err(DriverError::Io("disk unavailable".to_string())));
        assert!(!driver.is_ready());
        assert!(!driver.is_destroyed());
    }

    #[tokio::test]
    async fn hook_runs_once_on_the_new_connection() {
        let sink = Arc::new(MemoryEventSink::new());
        let driver = SqliteDriver::builder(SqliteDriverConfig::in_memory())
            .on_create_connection(|connection| {
                connection.execute(&CompiledQuery::raw("create table t (x integer)")).map(|_| ())
            })
            .event_sink(sink.clone())
            .build();
        driver.init().await.unwrap();
        let result = driver.execute(&CompiledQuery::raw("select count(*) from t")).await.unwrap();
        assert_eq!(result.rows().len(), 1);
        assert_eq!(sink.count("driver_init"), 1);
    }

    #[tokio::test]
    async fn failing_hook_aborts_init() {
        let driver = SqliteDriver::builder(SqliteDriverConfig::in_memory())
            .on_create_connection(|_| Err(DriverError::Hook("schema missing".to_string())))
            .build();
        assert!(matches!(driver.init().await, Err(DriverError::Hook(_))));
        assert!(!driver.is_ready());
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_terminal() {
        let driver = SqliteDriver::new(SqliteDriverConfig::in_memory());
        driver.init().await.unwrap();
        driver.destroy().await.unwrap();
        driver.destroy().await.unwrap();
        assert!(driver.is_destroyed());
        assert_eq!(driver.acquire_connection().await.err(), Some(DriverError::Destroyed));
        assert_eq!(driver.init().await, Err(DriverError::Destroyed));
    }
}
