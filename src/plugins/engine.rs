//! Script engine seam
//!
//! Plugin handlers and the profile script are third-party code. They are
//! only ever reached through [`ScriptEngine::invoke`]; callers wrap every
//! invocation in a deadline.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Failed to start interpreter `{interpreter}`: {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The handler threw; carries its message
    #[error("{0}")]
    Raised(String),

    #[error("{0} is not defined")]
    MissingHandler(String),

    #[error("Invalid handler name `{0}`")]
    InvalidHandler(String),

    #[error("Invalid handler output: {0}")]
    InvalidOutput(String),
}

/// One call into third-party code
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    /// Id of the plugin or profile the code belongs to
    pub owner: &'a str,
    /// Display name, used for logs
    pub name: &'a str,
    pub code: &'a str,
    /// Function the code must define, e.g. `onGenerate`
    pub handler: &'a str,
    /// `Plugin` metadata object visible to the code, if any
    pub plugin: Option<Value>,
    pub args: Vec<Value>,
}

pub trait ScriptEngine {
    fn invoke(&self, invocation: Invocation<'_>) -> impl Future<Output = Result<Value, ScriptError>>;
}

/// Arguments a native handler is called with
#[derive(Debug, Clone)]
pub struct NativeCall {
    pub plugin: Option<Value>,
    pub args: Vec<Value>,
}

type NativeHandler =
    Box<dyn Fn(NativeCall) -> BoxFuture<'static, Result<Value, ScriptError>> + Send + Sync>;

/// In-process engine: handlers are Rust closures registered per owner.
///
/// The `code` of an invocation is ignored, only `(owner, handler)` selects
/// what runs.
#[derive(Default)]
pub struct NativeEngine {
    handlers: HashMap<(String, String), NativeHandler>,
}

impl NativeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synchronous handler
    pub fn with_fn<F>(self, owner: &str, handler: &str, f: F) -> Self
    where
        F: Fn(NativeCall) -> Result<Value, ScriptError> + Send + Sync + 'static,
    {
        self.with_async(owner, handler, move |call| {
            let result = f(call);
            async move { result }
        })
    }

    /// Registers an asynchronous handler
    pub fn with_async<F, Fut>(mut self, owner: &str, handler: &str, f: F) -> Self
    where
        F: Fn(NativeCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ScriptError>> + Send + 'static,
    {
        self.handlers.insert(
            (owner.to_string(), handler.to_string()),
            Box::new(move |call| f(call).boxed()),
        );
        self
    }
}

impl ScriptEngine for NativeEngine {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<Value, ScriptError> {
        let key = (invocation.owner.to_string(), invocation.handler.to_string());
        let handler = self
            .handlers
            .get(&key)
            .ok_or_else(|| ScriptError::MissingHandler(invocation.handler.to_string()))?;
        handler(NativeCall {
            plugin: invocation.plugin,
            args: invocation.args,
        })
        .await
    }
}
