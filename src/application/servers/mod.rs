pub mod http;
pub mod rpc;
pub mod stdio;

use crate::config::{ServerConfig, ServerTransport};
use crate::domain::tool::{qualify, split_qualified, ToolDeclaration};
use http::HttpTransport;
use rpc::{ServerError, METHOD_CALL_TOOL, METHOD_LIST_TOOLS};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use stdio::StdioTransport;
use tracing::{info, warn};

const STDIO_SETTLE: Duration = Duration::from_secs(1);
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unstarted,
    Starting,
    Ready,
    Stopped,
}

enum Transport {
    /// Filled in once the child process is spawned; `None` means the server
    /// never started.
    Stdio(Option<StdioTransport>),
    Http(HttpTransport),
}

struct ManagedServer {
    config: ServerConfig,
    transport: Transport,
    state: LifecycleState,
    tools: Vec<ToolDeclaration>,
}

impl ManagedServer {
    fn new(config: ServerConfig) -> Self {
        let transport = match &config.transport {
            ServerTransport::Stdio { .. } => Transport::Stdio(None),
            ServerTransport::Http { url, headers } => Transport::Http(HttpTransport::new(
                &config.name,
                url.clone(),
                headers.clone(),
            )),
        };
        Self {
            config,
            transport,
            state: LifecycleState::Unstarted,
            tools: Vec::new(),
        }
    }

    async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ServerError> {
        match &self.transport {
            Transport::Stdio(Some(transport)) => transport.request(method, params, timeout).await,
            Transport::Stdio(None) => Err(ServerError::NotRunning {
                server: self.config.name.clone(),
            }),
            Transport::Http(transport) => transport.request(method, params, timeout).await,
        }
    }
}

/// Owns every configured tool server: spawns them, discovers their tool
/// catalogues, routes namespaced calls, and tears them down once. Servers are
/// optional capacity, so a server that fails to start or answer discovery is
/// left running with an empty catalogue rather than failing the session.
pub struct ServerManager {
    servers: Vec<ManagedServer>,
    index: HashMap<String, usize>,
    shut_down: AtomicBool,
}

impl ServerManager {
    pub fn new(configs: Vec<ServerConfig>) -> Self {
        let mut servers = Vec::with_capacity(configs.len());
        let mut index = HashMap::new();
        for config in configs {
            if index.contains_key(&config.name) {
                warn!(server = %config.name, "duplicate server name, keeping the first");
                continue;
            }
            index.insert(config.name.clone(), servers.len());
            servers.push(ManagedServer::new(config));
        }
        Self {
            servers,
            index,
            shut_down: AtomicBool::new(false),
        }
    }

    pub async fn start_all(&mut self) {
        for server in &mut self.servers {
            server.state = LifecycleState::Starting;

            if let ServerTransport::Stdio { command, args, env } = &server.config.transport {
                match StdioTransport::spawn(&server.config.name, command, args, env).await {
                    Ok(transport) => {
                        server.transport = Transport::Stdio(Some(transport));
                        tokio::time::sleep(STDIO_SETTLE).await;
                    }
                    Err(err) => {
                        warn!(server = %server.config.name, error = %err, "server failed to start, continuing without it");
                        server.state = LifecycleState::Ready;
                        continue;
                    }
                }
            }

            match server
                .request(METHOD_LIST_TOOLS, json!({}), DISCOVERY_TIMEOUT)
                .await
            {
                Ok(result) => {
                    server.tools = parse_catalogue(&server.config.name, &result);
                    info!(
                        server = %server.config.name,
                        tools = server.tools.len(),
                        "server ready"
                    );
                }
                Err(err) => {
                    warn!(server = %server.config.name, error = %err, "tool discovery failed, continuing with no tools");
                }
            }
            server.state = LifecycleState::Ready;
        }
    }

    /// Every discovered tool, namespaced so the model can address it.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.servers
            .iter()
            .flat_map(|server| {
                server.tools.iter().map(|tool| ToolDeclaration {
                    name: qualify(&server.config.name, &tool.name),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                })
            })
            .collect()
    }

    pub fn state_of(&self, name: &str) -> Option<LifecycleState> {
        self.index.get(name).map(|&i| self.servers[i].state)
    }

    /// Routes a namespaced call to its server and unwraps the
    /// protocol-level result envelope into plain text when possible.
    pub async fn call(&self, qualified: &str, arguments: Value) -> Result<String, ServerError> {
        let (server_name, tool_name) = split_qualified(qualified).ok_or_else(|| {
            ServerError::InvalidName {
                name: qualified.to_string(),
            }
        })?;
        let server = self
            .index
            .get(server_name)
            .map(|&i| &self.servers[i])
            .ok_or_else(|| ServerError::UnknownServer {
                server: server_name.to_string(),
            })?;

        let params = json!({"name": tool_name, "arguments": arguments});
        let result = server.request(METHOD_CALL_TOOL, params, CALL_TIMEOUT).await?;
        Ok(extract_text(&result))
    }

    /// Idempotent: the second and later calls are no-ops, so both the normal
    /// session epilogue and a drop-time fallback can invoke it.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        for server in &self.servers {
            if let Transport::Stdio(Some(transport)) = &server.transport {
                transport.shutdown(SHUTDOWN_GRACE).await;
            }
        }
    }
}

fn parse_catalogue(server: &str, result: &Value) -> Vec<ToolDeclaration> {
    let Some(entries) = result.get("tools").and_then(Value::as_array) else {
        warn!(server, "tools/list result missing tools array");
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name").and_then(Value::as_str)?;
            Some(ToolDeclaration {
                name: name.to_string(),
                description: entry
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                parameters: entry
                    .get("inputSchema")
                    .cloned()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            })
        })
        .collect()
}

/// Call results arrive as a content-block list; the common case is a single
/// text block. Anything else is passed through serialized.
fn extract_text(result: &Value) -> String {
    if let Some(blocks) = result.get("content").and_then(Value::as_array) {
        let texts: Vec<&str> = blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect();
        if !texts.is_empty() {
            return texts.join("\n");
        }
    }
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerTransport;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_config(name: &str, url: String) -> ServerConfig {
        ServerConfig {
            name: name.to_string(),
            transport: ServerTransport::Http {
                url,
                headers: HashMap::new(),
            },
        }
    }

    #[tokio::test]
    async fn discovers_and_namespaces_tools() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"tools": [
                    {"name": "search", "description": "find things",
                     "inputSchema": {"type": "object"}}
                ]}
            })))
            .mount(&mock)
            .await;

        let mut manager = ServerManager::new(vec![http_config("docs", mock.uri())]);
        manager.start_all().await;

        let declarations = manager.declarations();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].name, "mcp__docs__search");
        assert_eq!(manager.state_of("docs"), Some(LifecycleState::Ready));
    }

    #[tokio::test]
    async fn call_unwraps_text_content() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                json!({"method": "tools/call", "params": {"name": "search"}}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": {"content": [{"type": "text", "text": "three results"}]}
            })))
            .mount(&mock)
            .await;

        let manager = ServerManager::new(vec![http_config("docs", mock.uri())]);
        let text = manager
            .call("mcp__docs__search", json!({"query": "rust"}))
            .await
            .expect("call succeeds");
        assert_eq!(text, "three results");
    }

    #[tokio::test]
    async fn failed_server_degrades_to_empty_catalogue() {
        let config = ServerConfig {
            name: "ghost".to_string(),
            transport: ServerTransport::Stdio {
                command: "/nonexistent/mcp-server".to_string(),
                args: Vec::new(),
                env: HashMap::new(),
            },
        };
        let mut manager = ServerManager::new(vec![config]);
        manager.start_all().await;

        assert!(manager.declarations().is_empty());
        assert_eq!(manager.state_of("ghost"), Some(LifecycleState::Ready));
    }

    #[tokio::test]
    async fn unknown_server_is_a_typed_error() {
        let manager = ServerManager::new(Vec::new());
        let err = manager
            .call("mcp__missing__tool", json!({}))
            .await
            .expect_err("unknown server");
        assert!(matches!(err, ServerError::UnknownServer { .. }));
    }

    #[tokio::test]
    async fn malformed_name_is_rejected() {
        let manager = ServerManager::new(Vec::new());
        let err = manager
            .call("not_namespaced", json!({}))
            .await
            .expect_err("bad name");
        assert!(matches!(err, ServerError::InvalidName { .. }));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let manager = ServerManager::new(Vec::new());
        manager.shutdown().await;
        manager.shutdown().await;
    }
}
