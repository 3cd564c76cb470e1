// crates/sqlgate-worker/src/protocol.rs
// ============================================================================
// Module: Worker Wire Protocol
// Description: Call, response, and idle messages exchanged with the host.
// Purpose: Define the JSON shapes crossing the worker thread boundary.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The host sends `{"id": .., "type": "<handler>", "args": [..]}`. The worker
//! answers each call with exactly one `{"id": .., "result": ..}` or
//! `{"id": .., "error": ".."}`, and sends the bare string `"idle"` whenever
//! its in-flight count returns to zero.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Wire literal for the idle notification.
pub const IDLE_TOKEN: &str = "idle";

// ============================================================================
// SECTION: Identifiers
// ============================================================================

/// Correlation token chosen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallId {
    /// Numeric identifier, echoed back exactly as received.
    Number(serde_json::Number),
    /// String identifier.
    Text(String),
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<u64> for CallId {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

// ============================================================================
// SECTION: Messages
// ============================================================================

/// Host-to-worker call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMessage {
    /// Correlation token echoed in the response.
    pub id: CallId,
    /// Registered handler name.
    #[serde(rename = "type")]
    pub handler: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl CallMessage {
    /// Builds a call.
    #[must_use]
    pub fn new(
        id: impl Into<CallId>,
        handler: impl Into<String>,
        args: Vec<serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            handler: handler.into(),
            args,
        }
    }
}

/// Worker-to-host response; exactly one per dispatched call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseMessage {
    /// The call failed. Listed first so a payload carrying `error` never
    /// decodes as a null result.
    Error {
        /// Call identifier.
        id: CallId,
        /// Failure description.
        error: String,
    },
    /// The call succeeded.
    Result {
        /// Call identifier.
        id: CallId,
        /// Handler output.
        result: serde_json::Value,
    },
}

impl ResponseMessage {
    /// Returns the correlation token.
    #[must_use]
    pub const fn id(&self) -> &CallId {
        match self {
            Self::Error {
                id, ..
            }
            | Self::Result {
                id, ..
            } => id,
        }
    }

    /// Returns true for error responses.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// The bare `"idle"` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdleToken;

impl Serialize for IdleToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(IDLE_TOKEN)
    }
}

impl<'de> Deserialize<'de> for IdleToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let literal = String::deserialize(deserializer)?;
        if literal == IDLE_TOKEN {
            Ok(Self)
        } else {
            Err(de::Error::invalid_value(de::Unexpected::Str(&literal), &"the string \"idle\""))
        }
    }
}

/// Any message the worker sends to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerMessage {
    /// In-flight count returned to zero.
    Idle(IdleToken),
    /// Response to one call.
    Response(ResponseMessage),
}

impl WorkerMessage {
    /// Returns true for the idle notification.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle(_))
    }

    /// Returns the response, if this is one.
    #[must_use]
    pub const fn as_response(&self) -> Option<&ResponseMessage> {
        match self {
            Self::Response(response) => Some(response),
            Self::Idle(_) => None,
        }
    }
}

impl From<ResponseMessage> for WorkerMessage {
    fn from(response: ResponseMessage) -> Self {
        Self::Response(response)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::CallId;
    use super::CallMessage;
    use super::IdleToken;
    use super::ResponseMessage;
    use super::WorkerMessage;

    #[test]
    fn call_decodes_type_and_defaults_args() {
        let call: CallMessage = serde_json::from_value(json!({"id": "a-1", "type": "ping"})).unwrap();
        assert_eq!(call.id, CallId::Text("a-1".to_string()));
        assert_eq!(call.handler, "ping");
        assert!(call.args.is_empty());
    }

    #[test]
    fn responses_serialize_flat() {
        let ok = ResponseMessage::Result {
            id: CallId::from(1_u64),
            result: json!("x"),
        };
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"id": 1, "result": "x"}));
        let failed = ResponseMessage::Error {
            id: CallId::from(2_u64),
            error: "boom".to_string(),
        };
        assert_eq!(serde_json::to_value(&failed).unwrap(), json!({"id": 2, "error": "boom"}));
    }

    #[test]
    fn any_json_number_is_a_valid_id() {
        for id in [json!(-7), json!(2.5), json!(18_446_744_073_709_551_615_u64)] {
            let call: CallMessage =
                serde_json::from_value(json!({"id": id.clone(), "type": "ping"})).unwrap();
            let response = ResponseMessage::Result {
                id: call.id,
                result: json!(null),
            };
            assert_eq!(serde_json::to_value(&response).unwrap(), json!({"id": id, "result": null}));
        }
    }

    #[test]
    fn worker_messages_decode_by_shape() {
        let idle: WorkerMessage = serde_json::from_str("\"idle\"").unwrap();
        assert_eq!(idle, WorkerMessage::Idle(IdleToken));
        let error: WorkerMessage = serde_json::from_value(json!({"id": 3, "error": "no"})).unwrap();
        assert!(error.as_response().unwrap().is_error());
        let null: WorkerMessage = serde_json::from_value(json!({"id": 4, "result": null})).unwrap();
        assert!(!null.as_response().unwrap().is_error());
        assert!(serde_json::from_str::<WorkerMessage>("\"busy\"").is_err());
    }
}
