use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";
pub const METHOD_LIST_TOOLS: &str = "tools/list";
pub const METHOD_CALL_TOOL: &str = "tools/call";

/// JSON-RPC 2.0 request, shared by both transports. Request ids are unique
/// per outstanding request (allocated from an atomic counter per transport);
/// reusing a fixed id would silently mismatch responses as soon as two
/// requests to one server overlap.
#[derive(Debug, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub id: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorBody {
    #[serde(default = "default_error_code")]
    pub code: i64,
    #[serde(default = "default_error_message")]
    pub message: String,
}

fn default_error_code() -> i64 {
    -32000
}

fn default_error_message() -> String {
    "unknown error".to_string()
}

impl RpcResponse {
    /// Extracts the result payload, mapping a JSON-RPC error object to a
    /// typed error for the named server.
    pub fn into_result(self, server: &str) -> Result<Value, ServerError> {
        if let Some(error) = self.error {
            return Err(ServerError::Rpc {
                server: server.to_string(),
                code: error.code,
                message: error.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("tool server '{server}' is not configured")]
    UnknownServer { server: String },
    #[error("'{name}' is not a valid namespaced tool name")]
    InvalidName { name: String },
    #[error("failed to spawn tool server '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },
    #[error("tool server '{server}' is not running")]
    NotRunning { server: String },
    #[error("tool server '{server}' transport error: {message}")]
    Transport { server: String, message: String },
    #[error("tool server '{server}' returned invalid JSON: {source}")]
    InvalidJson {
        server: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("tool server '{server}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },
    #[error("tool server '{server}' did not respond in time")]
    Timeout { server: String },
    #[error("tool server '{server}' terminated unexpectedly")]
    Terminated { server: String },
}
