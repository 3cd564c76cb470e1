// crates/sqlgate-worker/src/dispatcher.rs
// ============================================================================
// Module: Worker RPC Dispatcher
// Description: Call routing, in-flight accounting, and idle notifications.
// Purpose: Turn every received call into exactly one response.
// Dependencies: tokio, sqlgate-core, crate::{handler, protocol}
// ============================================================================

//! ## Overview
//! [`WorkerDispatcher`] owns the handler table and the in-flight counter for
//! one worker. Its receive loop keeps reading calls while earlier calls run,
//! so a slow handler never blocks dispatch.
//!
//! # Invariants
//! - Every received call yields exactly one response with the same id.
//! - `"idle"` is sent once per transition of the in-flight count from above
//!   zero to zero, always after the response that caused it.
//! - Unknown handler names get an immediate error response and never touch
//!   the in-flight count.
//! - A panicking handler yields an error response; the loop keeps running.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;
use sqlgate_core::EventSink;
use sqlgate_core::NoopEventSink;
use sqlgate_core::TelemetryEvent;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::task::JoinSet;

use crate::error::WorkerError;
use crate::handler::HandlerError;
use crate::handler::HandlerTable;
use crate::protocol::CallId;
use crate::protocol::CallMessage;
use crate::protocol::IdleToken;
use crate::protocol::ResponseMessage;
use crate::protocol::WorkerMessage;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Telemetry component label.
const COMPONENT: &str = "worker_dispatcher";

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Outcome of one dispatched call.
struct Settled {
    /// Call identifier.
    id: CallId,
    /// Handler name, for telemetry.
    handler: String,
    /// Handler output.
    outcome: Result<Value, HandlerError>,
}

/// Per-worker call dispatcher.
pub struct WorkerDispatcher {
    /// Frozen handler table.
    table: HandlerTable,
    /// Calls dispatched but not yet settled.
    in_flight: usize,
    /// Telemetry sink.
    sink: Arc<dyn EventSink>,
}

impl WorkerDispatcher {
    /// Creates a dispatcher with nothing in flight.
    #[must_use]
    pub fn new(table: HandlerTable) -> Self {
        Self {
            table,
            in_flight: 0,
            sink: Arc::new(NoopEventSink),
        }
    }

    /// Routes telemetry events to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the number of calls currently in flight.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Runs the receive loop until `inbox` closes and every call settles.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Channel`] when the host stops listening and
    /// [`WorkerError::Runtime`] when the task set fails.
    pub async fn run(
        mut self,
        mut inbox: mpsc::Receiver<CallMessage>,
        outbox: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Result<(), WorkerError> {
        let mut calls: JoinSet<Settled> = JoinSet::new();
        let mut accepting = true;
        loop {
            tokio::select! {
                received = inbox.recv(), if accepting => match received {
                    Some(call) => self.dispatch(call, &mut calls, &outbox)?,
                    None => accepting = false,
                },
                Some(joined) = calls.join_next(), if !calls.is_empty() => {
                    let settled = joined.map_err(|err| WorkerError::Runtime(err.to_string()))?;
                    self.settle(settled, &outbox)?;
                }
                else => break,
            }
        }
        Ok(())
    }

    /// Resolves a call and starts its handler.
    fn dispatch(
        &mut self,
        call: CallMessage,
        calls: &mut JoinSet<Settled>,
        outbox: &mpsc::UnboundedSender<WorkerMessage>,
    ) -> Result<(), WorkerError> {
        let CallMessage {
            id,
            handler: name,
            args,
        } = call;
        let Some(handler) = self.table.get(&name) else {
            self.sink.record(
                &TelemetryEvent::new(COMPONENT, "rpc_unknown_handler")
                    .with_call_id(id.to_string())
                    .with_handler(name.clone()),
            );
            return send(outbox, ResponseMessage::Error {
                id,
                error: HandlerError::UnknownHandler(name).to_string(),
            });
        };
        self.in_flight += 1;
        self.sink.record(
            &TelemetryEvent::new(COMPONENT, "rpc_dispatched")
                .with_call_id(id.to_string())
                .with_handler(name.clone())
                .with_in_flight(self.in_flight),
        );
        calls.spawn(async move {
            let invocation = tokio::spawn(async move { handler.call(args).await });
            let outcome = invocation.await.unwrap_or_else(|err| Err(join_failure(err)));
            Settled {
                id,
                handler: name,
                outcome,
            }
        });
        Ok(())
    }

    /// Sends the response for a settled call and signals idleness.
    fn settle(
        &mut self,
        settled: Settled,
        outbox: &mpsc::UnboundedSender<WorkerMessage>,
    ) -> Result<(), WorkerError> {
        self.in_flight = self.in_flight.saturating_sub(1);
        let mut event = TelemetryEvent::new(COMPONENT, "rpc_settled")
            .with_call_id(settled.id.to_string())
            .with_handler(settled.handler)
            .with_in_flight(self.in_flight);
        let response = match settled.outcome {
            Ok(result) => ResponseMessage::Result {
                id: settled.id,
                result,
            },
            Err(err) => {
                event = event.with_message(err.to_string());
                ResponseMessage::Error {
                    id: settled.id,
                    error: err.to_string(),
                }
            }
        };
        self.sink.record(&event);
        send(outbox, response)?;
        if self.in_flight == 0 {
            self.sink.record(&TelemetryEvent::new(COMPONENT, "rpc_idle"));
            outbox
                .send(WorkerMessage::Idle(IdleToken))
                .map_err(|err| WorkerError::Channel(err.to_string()))?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Sends one response to the host.
fn send(
    outbox: &mpsc::UnboundedSender<WorkerMessage>,
    response: ResponseMessage,
) -> Result<(), WorkerError> {
    outbox.send(response.into()).map_err(|err| WorkerError::Channel(err.to_string()))
}

/// Converts a failed handler task into a handler error.
fn join_failure(err: JoinError) -> HandlerError {
    if err.is_panic() {
        HandlerError::Panicked(panic_message(err.into_panic().as_ref()))
    } else {
        HandlerError::Failed("handler task cancelled".to_string())
    }
}

/// Extracts a readable panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use std::sync::Arc;

    use serde_json::json;
    use sqlgate_core::MemoryEventSink;
    use tokio::sync::mpsc;
    use tokio::sync::watch;

    use super::WorkerDispatcher;
    use crate::handler::HandlerError;
    use crate::handler::HandlerTable;
    use crate::handler::typed_handler;
    use crate::protocol::CallId;
    use crate::protocol::CallMessage;
    use crate::protocol::ResponseMessage;
    use crate::protocol::WorkerMessage;

    async fn run_calls(table: HandlerTable, calls: Vec<CallMessage>) -> Vec<WorkerMessage> {
        let (call_tx, call_rx) = mpsc::channel(calls.len().max(1));
        let (message_tx, mut message_rx) = mpsc::unbounded_channel();
        for call in calls {
            call_tx.send(call).await.unwrap();
        }
        drop(call_tx);
        WorkerDispatcher::new(table).run(call_rx, message_tx).await.unwrap();
        let mut messages = Vec::new();
        while let Some(message) = message_rx.recv().await {
            messages.push(message);
        }
        messages
    }

    fn echo_table() -> HandlerTable {
        HandlerTable::builder()
            .register("echo", typed_handler(|(value,): (serde_json::Value,)| async move { Ok::<_, HandlerError>(value) }))
            .register(
                "explode",
                typed_handler(|_: Vec<serde_json::Value>| async move {
                    if true {
                        panic!("kaboom");
                    }
                    Ok::<(), HandlerError>(())
                }),
            )
            .build()
    }

    #[tokio::test]
    async fn echo_answers_then_goes_idle() {
        let messages =
            run_calls(echo_table(), vec![CallMessage::new(1_u64, "echo", vec![json!("x")])]).await;
        let wire: Vec<_> = messages.iter().map(|message| serde_json::to_value(message).unwrap()).collect();
        assert_eq!(wire, vec![json!({"id": 1, "result": "x"}), json!("idle")]);
    }

    #[tokio::test]
    async fn unknown_handler_gets_error_without_idle() {
        let messages = run_calls(echo_table(), vec![CallMessage::new("q", "nope", Vec::new())]).await;
        assert_eq!(messages, vec![WorkerMessage::Response(ResponseMessage::Error {
            id: CallId::Text("q".to_string()),
            error: "unknown handler: nope".to_string(),
        })]);
    }

    #[tokio::test]
    async fn panicking_handler_yields_error_response() {
        let messages = run_calls(echo_table(), vec![
            CallMessage::new(1_u64, "explode", Vec::new()),
            CallMessage::new(2_u64, "echo", vec![json!(2)]),
        ])
        .await;
        let responses: Vec<_> = messages.iter().filter_map(WorkerMessage::as_response).collect();
        assert_eq!(responses.len(), 2);
        let exploded = responses.iter().find(|response| *response.id() == CallId::from(1_u64)).unwrap();
        assert!(matches!(exploded, ResponseMessage::Error { error, .. } if error.contains("kaboom")));
        assert!(messages.last().unwrap().is_idle());
    }

    #[tokio::test]
    async fn concurrent_calls_produce_one_idle_after_the_last() {
        const CALLS: u64 = 8;
        let (open_tx, open_rx) = watch::channel(false);
        let table = HandlerTable::builder()
            .register(
                "wait",
                typed_handler(move |(value,): (u64,)| {
                    let mut open = open_rx.clone();
                    async move {
                        open.wait_for(|ready| *ready)
                            .await
                            .map_err(|err| HandlerError::Failed(err.to_string()))?;
                        Ok::<u64, HandlerError>(value)
                    }
                }),
            )
            .build();
        let sink = Arc::new(MemoryEventSink::new());
        let (call_tx, call_rx) = mpsc::channel(16);
        let (message_tx, mut message_rx) = mpsc::unbounded_channel();
        let dispatcher = WorkerDispatcher::new(table).with_event_sink(sink.clone());
        let running = tokio::spawn(dispatcher.run(call_rx, message_tx));

        for id in 0 .. CALLS {
            call_tx.send(CallMessage::new(id, "wait", vec![json!(id)])).await.unwrap();
        }
        while sink.count("rpc_dispatched") < usize::try_from(CALLS).unwrap() {
            tokio::task::yield_now().await;
        }
        assert!(message_rx.try_recv().is_err());
        open_tx.send(true).unwrap();

        let mut messages = Vec::new();
        for _ in 0 ..= CALLS {
            messages.push(message_rx.recv().await.unwrap());
        }
        drop(call_tx);
        running.await.unwrap().unwrap();
        assert!(message_rx.recv().await.is_none());

        let idle_positions: Vec<_> =
            messages.iter().enumerate().filter(|(_, message)| message.is_idle()).collect();
        assert_eq!(idle_positions.len(), 1);
        assert_eq!(idle_positions[0].0, messages.len() - 1);
        let mut ids: Vec<_> =
            messages.iter().filter_map(WorkerMessage::as_response).map(|r| r.id().clone()).collect();
        ids.sort_by_key(ToString::to_string);
        ids.dedup();
        assert_eq!(ids.len(), usize::try_from(CALLS).unwrap());
        assert_eq!(sink.count("rpc_idle"), 1);
    }

    #[tokio::test]
    async fn idle_repeats_for_each_busy_period() {
        let messages = run_calls(echo_table(), vec![CallMessage::new(1_u64, "echo", vec![json!(1)])]).await;
        assert_eq!(messages.iter().filter(|message| message.is_idle()).count(), 1);

        let (call_tx, call_rx) = mpsc::channel(4);
        let (message_tx, mut message_rx) = mpsc::unbounded_channel();
        let running = tokio::spawn(WorkerDispatcher::new(echo_table()).run(call_rx, message_tx));
        for id in [1_u64, 2] {
            call_tx.send(CallMessage::new(id, "echo", vec![json!(id)])).await.unwrap();
            assert!(!message_rx.recv().await.unwrap().is_idle());
            assert!(message_rx.recv().await.unwrap().is_idle());
        }
        drop(call_tx);
        running.await.unwrap().unwrap();
    }
}
