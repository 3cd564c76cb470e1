// crates/sqlgate-worker/src/thread.rs
// ============================================================================
// Module: Worker Thread
// Description: Dedicated OS thread hosting one dispatcher.
// Purpose: Give the host a message-passing handle to a worker.
// Dependencies: serde, tokio, sqlgate-core, crate::dispatcher
// ============================================================================

//! ## Overview
//! [`spawn_worker_thread`] starts a named thread running a single-threaded
//! tokio runtime and one [`WorkerDispatcher`]. The host talks to it only
//! through [`WorkerThread`]: calls go in over a bounded channel, responses
//! and idle notifications come back over an unbounded one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use serde::Deserialize;
use sqlgate_core::EventSink;
use tokio::sync::mpsc;

use crate::dispatcher::WorkerDispatcher;
use crate::error::WorkerError;
use crate::handler::HandlerTable;
use crate::protocol::CallMessage;
use crate::protocol::WorkerMessage;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Default worker thread name.
const DEFAULT_THREAD_NAME: &str = "sqlgate-worker";
/// Default inbox capacity.
const DEFAULT_INBOX_CAPACITY: usize = 1024;

/// Worker thread configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkerConfig {
    /// OS thread name.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    /// Calls buffered before `send` waits.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Invalid`] for an empty thread name or a zero
    /// inbox capacity.
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.thread_name.trim().is_empty() {
            return Err(WorkerError::Invalid("thread_name must not be empty".to_string()));
        }
        if self.inbox_capacity == 0 {
            return Err(WorkerError::Invalid("inbox_capacity must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Returns the default thread name.
fn default_thread_name() -> String {
    DEFAULT_THREAD_NAME.to_string()
}

/// Returns the default inbox capacity.
const fn default_inbox_capacity() -> usize {
    DEFAULT_INBOX_CAPACITY
}

// ============================================================================
// SECTION: Spawn
// ============================================================================

/// Starts a worker thread serving `table`.
///
/// # Errors
///
/// Returns [`WorkerError`] when the configuration is invalid or the thread
/// cannot be spawned.
pub fn spawn_worker_thread(
    config: &WorkerConfig,
    table: HandlerTable,
    sink: Arc<dyn EventSink>,
) -> Result<WorkerThread, WorkerError> {
    config.validate()?;
    let (call_tx, call_rx) = mpsc::channel(config.inbox_capacity);
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let join = thread::Builder::new()
        .name(config.thread_name.clone())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|err| WorkerError::Runtime(err.to_string()))?;
            let dispatcher = WorkerDispatcher::new(table).with_event_sink(sink);
            runtime.block_on(dispatcher.run(call_rx, message_tx))
        })
        .map_err(|err| WorkerError::Spawn(err.to_string()))?;
    Ok(WorkerThread {
        calls: call_tx,
        messages: message_rx,
        join,
    })
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Host-side handle to a running worker.
pub struct WorkerThread {
    /// Call sender.
    calls: mpsc::Sender<CallMessage>,
    /// Response and idle receiver.
    messages: mpsc::UnboundedReceiver<WorkerMessage>,
    /// Worker thread.
    join: JoinHandle<Result<(), WorkerError>>,
}

impl WorkerThread {
    /// Sends a call from async code.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Channel`] when the worker has stopped.
    pub async fn send(&self, call: CallMessage) -> Result<(), WorkerError> {
        self.calls.send(call).await.map_err(|err| WorkerError::Channel(err.to_string()))
    }

    /// Sends a call from synchronous code. Must not be called from inside an
    /// async runtime.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Channel`] when the worker has stopped.
    pub fn send_blocking(&self, call: CallMessage) -> Result<(), WorkerError> {
        self.calls.blocking_send(call).map_err(|err| WorkerError::Channel(err.to_string()))
    }

    /// Receives the next response or idle notification.
    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        self.messages.recv().await
    }

    /// Receives from synchronous code. Must not be called from inside an
    /// async runtime.
    pub fn recv_blocking(&mut self) -> Option<WorkerMessage> {
        self.messages.blocking_recv()
    }

    /// Returns a sender usable from other tasks.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<CallMessage> {
        self.calls.clone()
    }

    /// Stops accepting calls, waits for in-flight calls to settle, and
    /// returns every message not yet received. Blocks the calling thread
    /// until every clone from [`WorkerThread::sender`] has been dropped too.
    ///
    /// # Errors
    ///
    /// Returns the worker's own error, or [`WorkerError::Runtime`] when the
    /// worker thread panicked.
    pub fn shutdown(self) -> Result<Vec<WorkerMessage>, WorkerError> {
        let Self {
            calls,
            mut messages,
            join,
        } = self;
        drop(calls);
        join.join().map_err(|_| WorkerError::Runtime("worker thread panicked".to_string()))??;
        let mut remaining = Vec::new();
        while let Ok(message) = messages.try_recv() {
            remaining.push(message);
        }
        Ok(remaining)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::WorkerConfig;
    use crate::error::WorkerError;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config: WorkerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.thread_name, "sqlgate-worker");
        assert_eq!(config.inbox_capacity, 1024);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = WorkerConfig {
            inbox_capacity: 0,
            ..WorkerConfig::default()
        };
        assert!(matches!(config.validate(), Err(WorkerError::Invalid(_))));
    }
}
