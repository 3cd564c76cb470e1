// crates/sqlgate-core/src/telemetry.rs
// ============================================================================
// Module: Telemetry Events
// Description: Structured JSON-line events for driver and worker activity.
// Purpose: Emit redacted operational logs without a logging framework.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Components report lifecycle and failure events through an [`EventSink`].
//! Sinks are intentionally lightweight so deployments can route events to
//! their preferred logging pipeline. Query parameters are never recorded;
//! only the SQL text and the parameter count are.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Event
// ============================================================================

/// One telemetry event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Emitting component label.
    pub component: &'static str,
    /// RPC call identifier, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// RPC handler name, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    /// SQL text, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// Parameter count (values are redacted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_count: Option<usize>,
    /// Time spent waiting, in microseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_us: Option<u64>,
    /// In-flight call count after the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_flight: Option<usize>,
    /// Free-form message, typically an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TelemetryEvent {
    /// Creates an event with the current timestamp.
    #[must_use]
    pub fn new(component: &'static str, event: &'static str) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            component,
            call_id: None,
            handler: None,
            sql: None,
            parameter_count: None,
            wait_us: None,
            in_flight: None,
            message: None,
        }
    }

    /// Attaches an RPC call identifier.
    #[must_use]
    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    /// Attaches an RPC handler name.
    #[must_use]
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Attaches SQL text and its parameter count.
    #[must_use]
    pub fn with_sql(mut self, sql: impl Into<String>, parameter_count: usize) -> Self {
        self.sql = Some(sql.into());
        self.parameter_count = Some(parameter_count);
        self
    }

    /// Attaches a wait duration in microseconds.
    #[must_use]
    pub const fn with_wait_us(mut self, wait_us: u64) -> Self {
        self.wait_us = Some(wait_us);
        self
    }

    /// Attaches the in-flight call count.
    #[must_use]
    pub const fn with_in_flight(mut self, in_flight: usize) -> Self {
        self.in_flight = Some(in_flight);
        self
    }

    /// Attaches a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Destination for telemetry events.
pub trait EventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: &TelemetryEvent);
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&self, _event: &TelemetryEvent) {}
}

/// Sink that logs JSON lines to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrEventSink;

impl EventSink for StderrEventSink {
    fn record(&self, event: &TelemetryEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that appends JSON lines to a file.
pub struct FileEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    /// Opens the log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for FileEventSink {
    fn record(&self, event: &TelemetryEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
        }
    }
}

/// Sink that keeps events in memory, for inspection in tests.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    /// Recorded events in arrival order.
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns the identifiers of recorded events.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .map(|events| events.iter().map(|event| event.event).collect())
            .unwrap_or_default()
    }

    /// Counts recorded events with the given identifier.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.names().into_iter().filter(|event| *event == name).count()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: &TelemetryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::EventSink;
    use super::MemoryEventSink;
    use super::TelemetryEvent;

    #[test]
    fn optional_fields_are_omitted() {
        let event = TelemetryEvent::new("driver", "query_failed").with_sql("select ?", 1);
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["sql"], "select ?");
        assert_eq!(encoded["parameter_count"], 1);
        assert!(encoded.get("call_id").is_none());
    }

    #[test]
    fn memory_sink_counts_events() {
        let sink = MemoryEventSink::new();
        sink.record(&TelemetryEvent::new("worker", "rpc_idle"));
        sink.record(&TelemetryEvent::new("worker", "rpc_idle"));
        sink.record(&TelemetryEvent::new("worker", "rpc_settled"));
        assert_eq!(sink.count("rpc_idle"), 2);
        assert_eq!(sink.names().len(), 3);
    }
}
