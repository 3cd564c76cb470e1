// crates/sqlgate-core/src/codec.rs
// ============================================================================
// Module: JSON Value Codec
// Description: Bridges structured values and the engine's scalar storage.
// Purpose: Encode structured write parameters as text; decode JSON text columns.
// Dependencies: serde_json, crate::{plugin, query, value}
// ============================================================================

//! ## Overview
//! The engine stores only scalars. [`JsonValuePlugin`] is the single place
//! where structured values cross that boundary:
//! - outgoing `INSERT`/`UPDATE` parameters holding [`Value::Json`] become
//!   their canonical JSON text;
//! - incoming text columns that start with `{` or `[` and parse as JSON become
//!   [`Value::Json`] again. Text that fails to parse is left untouched.
//!
//! Decoding is top-level only. Strings nested inside a decoded document are
//! kept as strings, so a stored document always reads back equal to what was
//! written.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::plugin::QueryPlugin;
use crate::query::CompiledQuery;
use crate::query::ExecutionResult;
use crate::query::QueryKind;
use crate::value::Value;

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Replaces a structured value with its canonical JSON text.
#[must_use]
pub fn encode_value(value: Value) -> Value {
    match value {
        Value::Json(document) => Value::Text(document.to_string()),
        other => other,
    }
}

/// Encodes every structured parameter in place.
pub fn encode_parameters(parameters: &mut [Value]) {
    for parameter in parameters.iter_mut() {
        if parameter.is_structured() {
            *parameter = encode_value(std::mem::take(parameter));
        }
    }
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Returns true when `text` may hold a JSON object or array.
fn looks_like_json(text: &str) -> bool {
    text.starts_with('{') || text.starts_with('[')
}

/// Restores a structured value from JSON text, leaving other values alone.
#[must_use]
pub fn decode_value(value: Value) -> Value {
    match value {
        Value::Text(text) if looks_like_json(&text) => {
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(document @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
                    Value::Json(document)
                }
                _ => Value::Text(text),
            }
        }
        other => other,
    }
}

/// Decodes every column of every row in a result.
#[must_use]
pub fn decode_result(result: ExecutionResult) -> ExecutionResult {
    match result {
        ExecutionResult::Rows {
            mut rows,
        } => {
            for row in &mut rows {
                for value in row.values_mut() {
                    *value = decode_value(std::mem::take(value));
                }
            }
            ExecutionResult::Rows {
                rows,
            }
        }
        mutation @ ExecutionResult::Mutation {
            ..
        } => mutation,
    }
}

// ============================================================================
// SECTION: Plugin
// ============================================================================

/// Plugin encoding structured write parameters and decoding JSON columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonValuePlugin;

impl JsonValuePlugin {
    /// Creates the plugin.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl QueryPlugin for JsonValuePlugin {
    fn transform_query(&self, mut query: CompiledQuery) -> CompiledQuery {
        if matches!(query.kind, QueryKind::Insert | QueryKind::Update) {
            encode_parameters(&mut query.parameters);
        }
        query
    }

    fn transform_result(&self, result: ExecutionResult) -> ExecutionResult {
        decode_result(result)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
