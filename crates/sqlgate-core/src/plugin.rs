// crates/sqlgate-core/src/plugin.rs
// ============================================================================
// Module: Query Plugins
// Description: Interception seam between callers and statement execution.
// Purpose: Let transforms rewrite outgoing queries and incoming results.
// Dependencies: crate::query
// ============================================================================

//! ## Overview
//! A [`QueryPlugin`] sees every query issued through a connection before it
//! reaches the statement executor, and every result (including each streamed
//! chunk) before it reaches the caller. Plugins run in configuration order in
//! both directions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::query::CompiledQuery;
use crate::query::ExecutionResult;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Query/result transform applied around statement execution.
pub trait QueryPlugin: Send + Sync {
    /// Rewrites an outgoing query.
    fn transform_query(&self, query: CompiledQuery) -> CompiledQuery {
        query
    }

    /// Rewrites an incoming result.
    fn transform_result(&self, result: ExecutionResult) -> ExecutionResult {
        result
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs `query` through every plugin in order.
#[must_use]
pub fn apply_query_plugins(plugins: &[Arc<dyn QueryPlugin>], query: CompiledQuery) -> CompiledQuery {
    plugins.iter().fold(query, |query, plugin| plugin.transform_query(query))
}

/// Runs `result` through every plugin in order.
#[must_use]
pub fn apply_result_plugins(
    plugins: &[Arc<dyn QueryPlugin>],
    result: ExecutionResult,
) -> ExecutionResult {
    plugins.iter().fold(result, |result, plugin| plugin.transform_result(result))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
