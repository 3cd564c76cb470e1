// crates/sqlgate-worker/src/lib.rs
// ============================================================================
// Module: sqlgate Worker
// Description: Worker-thread RPC for named async handlers.
// Purpose: Run handlers off the host thread with busy/idle signalling.
// Dependencies: sqlgate-core, sqlgate-sqlite, tokio
// ============================================================================

//! ## Overview
//! A host spawns a [`WorkerThread`], sends [`CallMessage`]s naming a handler,
//! and receives one [`ResponseMessage`] per call plus an idle notification
//! whenever the worker has nothing in flight. The idle signal lets the host
//! decide when a worker can be retired.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod database;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod thread;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use database::register_database_handlers;
pub use dispatcher::WorkerDispatcher;
pub use error::WorkerError;
pub use handler::Handler;
pub use handler::HandlerError;
pub use handler::HandlerTable;
pub use handler::HandlerTableBuilder;
pub use handler::TypedHandler;
pub use handler::typed_handler;
pub use protocol::CallId;
pub use protocol::CallMessage;
pub use protocol::IdleToken;
pub use protocol::ResponseMessage;
pub use protocol::WorkerMessage;
pub use thread::WorkerConfig;
pub use thread::WorkerThread;
pub use thread::spawn_worker_thread;
