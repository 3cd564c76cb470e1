// crates/sqlgate-worker/src/handler.rs
// ============================================================================
// Module: Worker Handlers
// Description: Handler trait, typed adapters, and the name-keyed table.
// Purpose: Resolve wire handler names to invocable async functions.
// Dependencies: async-trait, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Handlers are registered once, by name, into a [`HandlerTable`] that is
//! immutable after [`HandlerTableBuilder::build`]. The wire name is the only
//! dynamic part; [`typed_handler`] decodes the positional `args` array into a
//! typed tuple and encodes the typed output back to JSON.
//!
//! A handler produces exactly one value or one error. Streaming handlers
//! cannot be registered.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlgate_sqlite::DriverError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Handler failures, reported to the host as `{"id", "error"}`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// No handler is registered under the name.
    #[error("unknown handler: {0}")]
    UnknownHandler(String),
    /// Arguments did not match the handler's signature.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The handler ran and failed.
    #[error("{0}")]
    Failed(String),
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl From<DriverError> for HandlerError {
    fn from(err: DriverError) -> Self {
        Self::Failed(err.to_string())
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Async function invoked for one call.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Runs the handler on the call's positional arguments.
    async fn call(&self, args: Vec<Value>) -> Result<Value, HandlerError>;
}

/// Adapter from a typed async closure to [`Handler`].
pub struct TypedHandler<F, A, O, Fut> {
    /// Wrapped closure.
    function: F,
    /// Argument, output, and future types.
    types: PhantomData<fn(A) -> (O, Fut)>,
}

/// Wraps `function` so its arguments and output cross the wire as JSON.
///
/// `A` is decoded from the `args` array, so a handler taking one string is
/// written as `|(text,): (String,)| async move { .. }`.
pub const fn typed_handler<F, A, O, Fut>(function: F) -> TypedHandler<F, A, O, Fut>
where
    F: Fn(A) -> Fut + Send + Sync,
    A: DeserializeOwned,
    O: Serialize,
    Fut: Future<Output = Result<O, HandlerError>> + Send,
{
    TypedHandler {
        function,
        types: PhantomData,
    }
}

#[async_trait]
impl<F, A, O, Fut> Handler for TypedHandler<F, A, O, Fut>
where
    F: Fn(A) -> Fut + Send + Sync,
    A: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    Fut: Future<Output = Result<O, HandlerError>> + Send + 'static,
{
    async fn call(&self, args: Vec<Value>) -> Result<Value, HandlerError> {
        let typed: A = serde_json::from_value(Value::Array(args))
            .map_err(|err| HandlerError::InvalidArguments(err.to_string()))?;
        let output = (self.function)(typed).await?;
        serde_json::to_value(output).map_err(|err| HandlerError::Failed(err.to_string()))
    }
}

// ============================================================================
// SECTION: Table
// ============================================================================

/// Immutable name-to-handler mapping.
#[derive(Clone, Default)]
pub struct HandlerTable {
    /// Registered handlers by wire name.
    handlers: Arc<BTreeMap<String, Arc<dyn Handler>>>,
}

impl HandlerTable {
    /// Starts an empty table.
    #[must_use]
    pub fn builder() -> HandlerTableBuilder {
        HandlerTableBuilder::default()
    }

    /// Looks up a handler by wire name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).map(Arc::clone)
    }

    /// Returns the registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true when no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Collects handlers before the table is frozen.
#[derive(Default)]
pub struct HandlerTableBuilder {
    /// Handlers registered so far.
    handlers: BTreeMap<String, Arc<dyn Handler>>,
}

impl HandlerTableBuilder {
    /// Registers `handler` under `name`; a later registration replaces an
    /// earlier one with the same name.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Registers a shared handler instance.
    #[must_use]
    pub fn register_shared(mut self, name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Freezes the table.
    #[must_use]
    pub fn build(self) -> HandlerTable {
        HandlerTable {
            handlers: Arc::new(self.handlers),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
