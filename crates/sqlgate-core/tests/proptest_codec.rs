// crates/sqlgate-core/tests/proptest_codec.rs
// ============================================================================
// Module: JSON Codec Property-Based Tests
// Description: Round-trip and pass-through properties for the value codec.
// Purpose: Ensure the codec is lossless for documents and safe for plain text.
// ============================================================================

//! Property-based tests for the JSON value codec.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use sqlgate_core::Value;
use sqlgate_core::codec::decode_value;
use sqlgate_core::codec::encode_value;

fn json_leaf() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::Bool),
        any::<i64>().prop_map(|n| serde_json::Value::Number(n.into())),
        any::<f64>()
            .prop_filter_map("finite", serde_json::Number::from_f64)
            .prop_map(serde_json::Value::Number),
        ".{0,12}".prop_map(serde_json::Value::String),
    ]
}

fn json_document() -> impl Strategy<Value = serde_json::Value> {
    let tree = json_leaf().prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0 .. 6).prop_map(serde_json::Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0 .. 6)
                .prop_map(|map| serde_json::Value::Object(map.into_iter().collect())),
        ]
    });
    prop_oneof![
        prop::collection::vec(tree.clone(), 0 .. 4).prop_map(serde_json::Value::Array),
        prop::collection::btree_map("[a-z]{1,6}", tree, 0 .. 4)
            .prop_map(|map| serde_json::Value::Object(map.into_iter().collect())),
    ]
}

proptest! {
    #[test]
    fn structured_values_round_trip(document in json_document()) {
        let original = Value::Json(document);
        let encoded = encode_value(original.clone());
        prop_assert!(matches!(encoded, Value::Text(_)));
        prop_assert_eq!(decode_value(encoded), original);
    }

    #[test]
    fn float_arrays_round_trip_exactly(
        number in any::<f64>().prop_filter("finite", |n| n.is_finite())
    ) {
        let original = Value::Json(serde_json::json!([number]));
        prop_assert_eq!(decode_value(encode_value(original.clone())), original);
    }

    #[test]
    fn non_json_text_passes_through(text in "[^\\[{].{0,32}") {
        let value = Value::Text(text);
        prop_assert_eq!(decode_value(value.clone()), value);
    }
}
