// crates/sqlgate-core/src/value.rs
// ============================================================================
// Module: Values and Rows
// Description: Parameter and column values exchanged with the SQL engine.
// Purpose: Model scalar engine values alongside structured JSON documents.
// Dependencies: base64, serde, serde_json
// ============================================================================

//! ## Overview
//! [`Value`] covers the scalar storage classes of an embedded SQL engine plus a
//! single structured case, [`Value::Json`], holding an object or array. The
//! engine cannot store structured values directly; the codec plugin converts
//! them to text on the way in and back on the way out.
//!
//! [`Row`] pairs a shared column list with one value per column.
//!
//! ## Wire form
//! Values serialize as plain JSON with two single-key markers:
//! - `{"$blob": "<base64>"}` carries [`Value::Blob`];
//! - `{"$json": {...}}` wraps a [`Value::Json`] object whose only key is
//!   itself a marker, so documents never collide with the blob form.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde_json::Map;
use serde_json::Number;

// ============================================================================
// SECTION: Value
// ============================================================================

/// A single query parameter or result column value.
///
/// # Invariants
/// - [`Value::Json`] only ever holds a JSON object or array. Scalars coming
///   from JSON are mapped onto the primitive variants by [`Value::from`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL `NULL`.
    #[default]
    Null,
    /// Boolean, stored by the engine as `0`/`1`.
    Bool(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// Structured document (object or array).
    Json(serde_json::Value),
}

impl Value {
    /// Returns true for the structured (non-primitive) case.
    #[must_use]
    pub const fn is_structured(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    /// Returns the text payload when this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the integer payload when this is an integer value.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the structured payload when this is a JSON value.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Wire Form
// ============================================================================

/// Marker key carrying base64 blob bytes.
const BLOB_KEY: &str = "$blob";
/// Marker key wrapping a document that would otherwise look like a marker.
const JSON_KEY: &str = "$json";

/// Returns true when `map` has exactly one key and that key is a marker.
fn is_marker_object(map: &Map<String, serde_json::Value>) -> bool {
    map.len() == 1 && (map.contains_key(BLOB_KEY) || map.contains_key(JSON_KEY))
}

/// Builds a single-key marker object.
fn marker(key: &str, payload: serde_json::Value) -> serde_json::Value {
    let mut map = Map::new();
    map.insert(key.to_string(), payload);
    serde_json::Value::Object(map)
}

impl Value {
    /// Renders the value in its lossless JSON wire form.
    #[must_use]
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(flag) => serde_json::Value::Bool(*flag),
            Self::Integer(number) => serde_json::Value::Number((*number).into()),
            Self::Real(number) => {
                Number::from_f64(*number).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            Self::Text(text) => serde_json::Value::String(text.clone()),
            Self::Blob(bytes) => marker(BLOB_KEY, serde_json::Value::String(STANDARD.encode(bytes))),
            Self::Json(serde_json::Value::Object(map)) if is_marker_object(map) => {
                marker(JSON_KEY, serde_json::Value::Object(map.clone()))
            }
            Self::Json(document) => document.clone(),
        }
    }

    /// Parses a value from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns a message when a marker object carries a malformed payload.
    pub fn from_wire(wire: serde_json::Value) -> Result<Self, String> {
        match wire {
            serde_json::Value::Object(mut map) if is_marker_object(&map) => {
                if let Some(payload) = map.remove(BLOB_KEY) {
                    let encoded = payload
                        .as_str()
                        .ok_or_else(|| "blob payload must be a base64 string".to_string())?;
                    return STANDARD
                        .decode(encoded.as_bytes())
                        .map(Self::Blob)
                        .map_err(|err| format!("invalid blob payload: {err}"));
                }
                match map.remove(JSON_KEY) {
                    Some(document @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
                        Ok(Self::Json(document))
                    }
                    _ => Err("json payload must be an object or array".to_string()),
                }
            }
            other => Ok(Self::from(other)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = serde_json::Value::deserialize(deserializer)?;
        Self::from_wire(wire).map_err(D::Error::custom)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Bool(flag),
            serde_json::Value::Number(number) => number.as_i64().map_or_else(
                || number.as_f64().map_or(Self::Null, Self::Real),
                Self::Integer,
            ),
            serde_json::Value::String(text) => Self::Text(text),
            structured @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::Json(structured)
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        value.to_wire()
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ============================================================================
// SECTION: Row
// ============================================================================

/// One result row.
///
/// # Invariants
/// - `values.len()` equals the number of columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column names shared by every row of a result.
    columns: Arc<[String]>,
    /// Column values in column order.
    values: Vec<Value>,
}

impl Row {
    /// Builds a row from shared column names and its values.
    #[must_use]
    pub const fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self {
            columns,
            values,
        }
    }

    /// Returns the column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the values in column order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns mutable access to the values, for result transforms.
    pub fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }

    /// Returns the value at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the value of the first column named `name`.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|column| column == name)?;
        self.values.get(index)
    }

    /// Number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Renders the row as a JSON object keyed by column name.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = Map::new();
        for (column, value) in self.columns.iter().zip(&self.values) {
            object.insert(column.clone(), value.to_wire());
        }
        serde_json::Value::Object(object)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::Row;
    use super::Value;

    #[test]
    fn json_scalars_map_to_primitive_variants() {
        assert_eq!(Value::from(json!(null)), Value::Null);
        assert_eq!(Value::from(json!(7)), Value::Integer(7));
        assert_eq!(Value::from(json!(1.5)), Value::Real(1.5));
        assert_eq!(Value::from(json!("x")), Value::Text("x".to_string()));
        assert_eq!(Value::from(json!(true)), Value::Bool(true));
        assert!(Value::from(json!({"a": 1})).is_structured());
        assert!(Value::from(json!([1, 2])).is_structured());
    }

    #[test]
    fn every_variant_survives_the_wire() {
        let values = vec![
            Value::Null,
            Value::Bool(false),
            Value::Integer(-42),
            Value::Real(1.071_566_039_146_582_6e-75),
            Value::Real(3.0),
            Value::Text("[not json]".to_string()),
            Value::Blob(vec![0, 1, 2, 255]),
            Value::Blob(Vec::new()),
            Value::Json(json!({"a": [1, 2.5, "x"]})),
            Value::Json(json!([1, 2, 3])),
        ];
        for value in values {
            let text = serde_json::to_string(&value).unwrap();
            let decoded: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(decoded, value, "wire form {text}");
        }
    }

    #[test]
    fn blob_wire_form_is_distinct_from_arrays() {
        let blob = serde_json::to_value(Value::Blob(vec![1, 2, 3])).unwrap();
        assert_eq!(blob, json!({"$blob": "AQID"}));
        let decoded: Value = serde_json::from_value(json!([1, 2, 3])).unwrap();
        assert_eq!(decoded, Value::Json(json!([1, 2, 3])));
    }

    #[test]
    fn marker_shaped_documents_are_wrapped() {
        for document in [json!({"$blob": "AQID"}), json!({"$json": [1]})] {
            let value = Value::Json(document.clone());
            let wire = serde_json::to_value(&value).unwrap();
            assert_eq!(wire, json!({"$json": document}));
            let decoded: Value = serde_json::from_value(wire).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn malformed_markers_are_rejected() {
        assert!(serde_json::from_value::<Value>(json!({"$blob": 7})).is_err());
        assert!(serde_json::from_value::<Value>(json!({"$blob": "%%%"})).is_err());
        assert!(serde_json::from_value::<Value>(json!({"$json": "scalar"})).is_err());
    }

    #[test]
    fn row_lookup_by_name_uses_first_match() {
        let columns: std::sync::Arc<[String]> =
            vec!["id".to_string(), "name".to_string(), "id".to_string()].into();
        let row = Row::new(columns, vec![Value::Integer(1), "a".into(), Value::Integer(2)]);
        assert_eq!(row.get_by_name("id"), Some(&Value::Integer(1)));
        assert_eq!(row.get_by_name("missing"), None);
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn row_serializes_as_object() {
        let columns: std::sync::Arc<[String]> = vec!["id".to_string(), "meta".to_string()].into();
        let row = Row::new(columns, vec![Value::Integer(4), Value::Json(json!({"k": [1]}))]);
        let encoded = serde_json::to_value(&row).unwrap();
        assert_eq!(encoded, json!({"id": 4, "meta": {"k": [1]}}));
        assert_eq!(row.to_json(), encoded);
    }
}
