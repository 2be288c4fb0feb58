use super::rpc::{RpcRequest, RpcResponse, ServerError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// JSON-RPC over HTTP: each request is one POST body, each response one JSON
/// body. Configured headers ride on every request.
pub struct HttpTransport {
    server: String,
    url: String,
    headers: HashMap<String, String>,
    http: reqwest::Client,
    id_counter: AtomicU64,
}

impl HttpTransport {
    pub fn new(server: &str, url: String, headers: HashMap<String, String>) -> Self {
        Self {
            server: server.to_string(),
            url,
            headers,
            http: reqwest::Client::new(),
            id_counter: AtomicU64::new(1),
        }
    }

    pub async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ServerError> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let payload = RpcRequest::new(id, method, params);

        debug!(server = %self.server, method, id, "sending http rpc request");
        let mut builder = self.http.post(&self.url).timeout(timeout).json(&payload);
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                ServerError::Timeout {
                    server: self.server.clone(),
                }
            } else {
                ServerError::Transport {
                    server: self.server.clone(),
                    message: err.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServerError::Transport {
                server: self.server.clone(),
                message: format!("http status {status}"),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|err| ServerError::Transport {
                server: self.server.clone(),
                message: err.to_string(),
            })?;
        let parsed: RpcResponse =
            serde_json::from_str(&body).map_err(|source| ServerError::InvalidJson {
                server: self.server.clone(),
                source,
            })?;
        parsed.into_result(&self.server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_rpc_body_and_parses_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"jsonrpc": "2.0", "method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"tools": [{"name": "get-library-docs"}]}
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(
            "ctx7",
            format!("{}/mcp", server.uri()),
            HashMap::new(),
        );
        let result = transport
            .request("tools/list", json!({}), Duration::from_secs(5))
            .await
            .expect("list tools");
        assert!(result.get("tools").is_some());
    }

    #[tokio::test]
    async fn rpc_error_body_becomes_typed_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32602, "message": "bad params"}
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new("ctx7", server.uri(), HashMap::new());
        let err = transport
            .request("tools/call", json!({}), Duration::from_secs(5))
            .await
            .expect_err("rpc error");
        assert!(matches!(err, ServerError::Rpc { code: -32602, .. }));
    }

    #[tokio::test]
    async fn http_failure_becomes_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transport = HttpTransport::new("down", server.uri(), HashMap::new());
        let err = transport
            .request("tools/list", json!({}), Duration::from_secs(5))
            .await
            .expect_err("transport error");
        assert!(matches!(err, ServerError::Transport { .. }));
    }
}
