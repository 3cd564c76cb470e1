// crates/sqlgate-sqlite/src/lib.rs
// ============================================================================
// Module: sqlgate SQLite Driver
// Description: Single-connection SQLite driver for async callers.
// Purpose: Serialize async work onto one synchronous embedded database handle.
// Dependencies: sqlgate-core, rusqlite, tokio
// ============================================================================

//! ## Overview
//! This crate wraps one `SQLite` connection behind a FIFO [`ConnectionGate`].
//! Callers acquire a [`SqliteConnection`], run queries synchronously on it
//! (or stream reader results chunk by chunk), and release it. Transactions
//! are begun, committed, and rolled back on the connection that holds the
//! gate, so no other caller can interleave statements.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod executor;
pub mod gate;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::IN_MEMORY_PATH;
pub use config::SqliteDriverConfig;
pub use config::SqliteJournalMode;
pub use config::SqliteSyncMode;
pub use connection::DatabaseConnection;
pub use connection::QueryChunks;
pub use connection::QueryStream;
pub use connection::SqliteConnection;
pub use driver::ConnectionFactory;
pub use driver::ConnectionHook;
pub use driver::DatabaseSource;
pub use driver::Driver;
pub use driver::SqliteDriver;
pub use driver::SqliteDriverBuilder;
pub use error::DriverError;
pub use executor::RowChunks;
pub use executor::RowStream;
pub use executor::SqliteExecutor;
pub use gate::ConnectionGate;
pub use gate::GateGuard;
