mod filesystem;
mod shell;
mod web;

pub use filesystem::{EditTool, GlobTool, GrepTool, ReadTool, WriteTool};
pub use shell::BashTool;
pub use web::{WebFetchTool, WebSearchTool};

use crate::domain::tool::ToolDeclaration;
use crate::security::CommandGate;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Execution context handed to every local tool: the working directory the
/// session is confined to, the command gate for shell execution, and a shared
/// HTTP client. Built once at session creation.
#[derive(Clone)]
pub struct ToolContext {
    pub root: PathBuf,
    pub gate: Option<Arc<dyn CommandGate>>,
    pub http: reqwest::Client,
}

impl ToolContext {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            gate: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn CommandGate>) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// A locally implemented tool: a declaration for the model's function-calling
/// interface plus an executor.
///
/// `run` never fails past its own boundary. Every failure mode (missing
/// argument, file not found, path escape, timeout, gate rejection) comes back
/// as a result object carrying an `error` field.
#[async_trait]
pub trait LocalTool: Send + Sync {
    fn declaration(&self) -> ToolDeclaration;
    async fn run(&self, args: Value, ctx: &ToolContext) -> Value;
}

/// The complete built-in executor set, in declaration order.
pub fn builtin_tools() -> Vec<Arc<dyn LocalTool>> {
    vec![
        Arc::new(ReadTool),
        Arc::new(WriteTool),
        Arc::new(EditTool),
        Arc::new(GlobTool),
        Arc::new(GrepTool),
        Arc::new(BashTool),
        Arc::new(WebFetchTool),
        Arc::new(WebSearchTool),
    ]
}

pub(crate) fn error_value(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

pub(crate) fn missing_param(name: &str) -> Value {
    error_value(format!("missing required parameter: {name}"))
}

/// Fetches a required string argument, or the standard error result.
pub(crate) fn require_str<'a>(args: &'a Value, name: &str) -> Result<&'a str, Value> {
    args.get(name)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| missing_param(name))
}
