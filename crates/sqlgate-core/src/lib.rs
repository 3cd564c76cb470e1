// crates/sqlgate-core/src/lib.rs
// ============================================================================
// Module: sqlgate Core Library
// Description: Public API surface for the backend-agnostic query model.
// Purpose: Expose values, compiled queries, plugins, codec, and telemetry.
// Dependencies: crate::{codec, plugin, query, telemetry, value}
// ============================================================================

//! ## Overview
//! sqlgate core defines the data exchanged between a query builder, a
//! single-connection SQL driver, and worker threads that execute queries on a
//! coordinator's behalf. It holds no engine-specific code.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod codec;
pub mod plugin;
pub mod query;
pub mod telemetry;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use codec::JsonValuePlugin;
pub use plugin::QueryPlugin;
pub use plugin::apply_query_plugins;
pub use plugin::apply_result_plugins;
pub use query::CompiledQuery;
pub use query::ExecutionResult;
pub use query::QueryKind;
pub use telemetry::EventSink;
pub use telemetry::FileEventSink;
pub use telemetry::MemoryEventSink;
pub use telemetry::NoopEventSink;
pub use telemetry::StderrEventSink;
pub use telemetry::TelemetryEvent;
pub use value::Row;
pub use value::Value;
