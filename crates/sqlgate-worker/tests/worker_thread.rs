// crates/sqlgate-worker/tests/worker_thread.rs
// ============================================================================
// Module: Worker Thread Tests
// Description: Drive a spawned worker through its host-side handle.
// Purpose: Ensure calls cross the thread boundary and database handlers work.
// Dependencies: sqlgate-worker, sqlgate-sqlite, sqlgate-core, tempfile, tokio
// ============================================================================

//! ## Overview
//! Spawns real worker threads and talks to them only through
//! [`WorkerThread`], the way a coordinating host would. Database handlers run
//! against a driver that the host initialized on its own runtime.

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

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use sqlgate_core::FileEventSink;
use sqlgate_core::NoopEventSink;
use sqlgate_sqlite::Driver;
use sqlgate_sqlite::SqliteDriver;
use sqlgate_sqlite::SqliteDriverConfig;
use sqlgate_worker::CallId;
use sqlgate_worker::CallMessage;
use sqlgate_worker::HandlerError;
use sqlgate_worker::HandlerTable;
use sqlgate_worker::ResponseMessage;
use sqlgate_worker::WorkerConfig;
use sqlgate_worker::WorkerMessage;
use sqlgate_worker::WorkerThread;
use sqlgate_worker::register_database_handlers;
use sqlgate_worker::spawn_worker_thread;
use sqlgate_worker::typed_handler;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn ready_driver() -> Arc<SqliteDriver> {
    let driver = SqliteDriver::builder(SqliteDriverConfig::in_memory()).json_values().build();
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    runtime.block_on(driver.init()).unwrap();
    Arc::new(driver)
}

fn base_table() -> HandlerTable {
    HandlerTable::builder()
        .register("echo", typed_handler(|(value,): (Value,)| async move { Ok::<_, HandlerError>(value) }))
        .register(
            "thread_name",
            typed_handler(|_: Vec<Value>| async move {
                Ok::<_, HandlerError>(std::thread::current().name().map(str::to_string))
            }),
        )
        .build()
}

/// Sends one call and returns its response, asserting the idle that follows.
fn call(worker: &mut WorkerThread, id: u64, handler: &str, args: Vec<Value>) -> ResponseMessage {
    worker.send_blocking(CallMessage::new(id, handler, args)).unwrap();
    let response = match worker.recv_blocking().unwrap() {
        WorkerMessage::Response(response) => response,
        WorkerMessage::Idle(_) => panic!("idle arrived before the response"),
    };
    assert_eq!(*response.id(), CallId::from(id));
    assert!(worker.recv_blocking().unwrap().is_idle());
    response
}

fn result_of(response: ResponseMessage) -> Value {
    match response {
        ResponseMessage::Result {
            result, ..
        } => result,
        ResponseMessage::Error {
            error, ..
        } => panic!("unexpected error response: {error}"),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn echo_round_trips_across_the_thread() {
    let mut worker =
        spawn_worker_thread(&WorkerConfig::default(), base_table(), Arc::new(NoopEventSink))
            .unwrap();
    let response = call(&mut worker, 1, "echo", vec![json!("x")]);
    assert_eq!(serde_json::to_value(&response).unwrap(), json!({"id": 1, "result": "x"}));
    assert!(worker.shutdown().unwrap().is_empty());
}

#[test]
fn handlers_run_on_the_named_thread() {
    let config = WorkerConfig {
        thread_name: "sqlgate-worker-test".to_string(),
        ..WorkerConfig::default()
    };
    let mut worker = spawn_worker_thread(&config, base_table(), Arc::new(NoopEventSink)).unwrap();
    let name = result_of(call(&mut worker, 7, "thread_name", Vec::new()));
    assert_eq!(name, json!("sqlgate-worker-test"));
    worker.shutdown().unwrap();
}

#[test]
fn database_handlers_execute_and_transact() {
    let driver = ready_driver();
    let table = register_database_handlers(HandlerTable::builder(), Arc::clone(&driver)).build();
    let mut worker =
        spawn_worker_thread(&WorkerConfig::default(), table, Arc::new(NoopEventSink)).unwrap();

    result_of(call(&mut worker, 1, "db.execute", vec![json!({
        "sql": "create table notes (id integer primary key, body text)"
    })]));
    let inserted = result_of(call(&mut worker, 2, "db.execute", vec![json!({
        "sql": "insert into notes (body) values (?)",
        "parameters": [{"tags": ["a", "b"]}],
        "kind": "insert"
    })]));
    assert_eq!(inserted, json!({"rows_affected": 1, "insert_id": 1}));

    let failed = call(&mut worker, 3, "db.transaction", vec![json!([
        {"sql": "insert into notes (body) values (?)", "parameters": ["kept?"], "kind": "insert"},
        {"sql": "insert into missing values (1)", "kind": "insert"}
    ])]);
    assert!(failed.is_error());

    let batch = result_of(call(&mut worker, 4, "db.transaction", vec![json!([
        {"sql": "insert into notes (body) values (?)", "parameters": ["second"], "kind": "insert"},
        {"sql": "select body from notes order by id", "kind": "select"}
    ])]));
    assert_eq!(batch, json!([
        {"rows_affected": 1, "insert_id": 2},
        {"rows": [{"body": {"tags": ["a", "b"]}}, {"body": "second"}]}
    ]));

    let bad_args = call(&mut worker, 5, "db.execute", Vec::new());
    assert!(matches!(bad_args, ResponseMessage::Error { error, .. } if error.starts_with("invalid arguments")));

    worker.shutdown().unwrap();
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    runtime.block_on(driver.destroy()).unwrap();
}

#[test]
fn shutdown_drains_calls_still_in_flight() {
    let table = HandlerTable::builder()
        .register(
            "slow",
            typed_handler(|(value,): (u64,)| async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok::<_, HandlerError>(value)
            }),
        )
        .build();
    let worker =
        spawn_worker_thread(&WorkerConfig::default(), table, Arc::new(NoopEventSink)).unwrap();
    for id in 0_u64 .. 3 {
        worker.send_blocking(CallMessage::new(id, "slow", vec![json!(id)])).unwrap();
    }
    let remaining = worker.shutdown().unwrap();
    let responses = remaining.iter().filter(|message| !message.is_idle()).count();
    assert_eq!(responses, 3);
    assert!(remaining.last().unwrap().is_idle());
}

#[test]
fn telemetry_is_written_as_json_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("worker.log");
    let sink = Arc::new(FileEventSink::new(&path).unwrap());
    let mut worker = spawn_worker_thread(&WorkerConfig::default(), base_table(), sink).unwrap();
    call(&mut worker, 1, "echo", vec![json!(1)]);
    worker.send_blocking(CallMessage::new(2_u64, "missing", Vec::new())).unwrap();
    assert!(worker.recv_blocking().unwrap().as_response().unwrap().is_error());
    worker.shutdown().unwrap();

    let events: Vec<Value> = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let names: Vec<_> = events.iter().map(|event| event["event"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["rpc_dispatched", "rpc_settled", "rpc_idle", "rpc_unknown_handler"]);
    assert_eq!(events[0]["handler"], json!("echo"));
}
