use super::rpc::{RpcRequest, ServerError};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, warn};

/// Line-delimited JSON-RPC over a child process's pipes.
///
/// One background task owns the stdout pipe and routes each response line to
/// the oneshot responder registered under its request id, so requests can
/// overlap without mismatching replies. Writes go through a shared buffered
/// writer; each request is a single newline-terminated line.
#[derive(Clone)]
pub struct StdioTransport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    server: String,
    child: AsyncMutex<Option<Child>>,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    pending: AsyncMutex<HashMap<u64, oneshot::Sender<Value>>>,
    id_counter: AtomicU64,
}

impl StdioTransport {
    pub async fn spawn(
        server: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, ServerError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| ServerError::Spawn {
            server: server.to_string(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or_else(|| ServerError::Transport {
            server: server.to_string(),
            message: "failed to capture server stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ServerError::Transport {
            server: server.to_string(),
            message: "failed to capture server stdout".to_string(),
        })?;

        let transport = Self {
            inner: Arc::new(TransportInner {
                server: server.to_string(),
                child: AsyncMutex::new(Some(child)),
                writer: AsyncMutex::new(Some(BufWriter::new(stdin))),
                pending: AsyncMutex::new(HashMap::new()),
                id_counter: AtomicU64::new(1),
            }),
        };

        let reader_inner = Arc::clone(&transport.inner);
        tokio::spawn(async move {
            reader_inner.reader_loop(stdout).await;
        });

        Ok(transport)
    }

    /// Sends one request and awaits its correlated response line. A server
    /// that does not answer within `timeout` costs only this call, not the
    /// session: the pending slot is dropped and the caller gets a timeout
    /// error.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ServerError> {
        let id = self.inner.id_counter.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock().await;
            pending.insert(id, tx);
        }

        if let Err(err) = self.write_line(RpcRequest::new(id, method, params)).await {
            self.inner.pending.lock().await.remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => self.inner.unpack(response),
            Ok(Err(_)) => Err(ServerError::Terminated {
                server: self.inner.server.clone(),
            }),
            Err(_) => {
                self.inner.pending.lock().await.remove(&id);
                Err(ServerError::Timeout {
                    server: self.inner.server.clone(),
                })
            }
        }
    }

    async fn write_line(&self, request: RpcRequest) -> Result<(), ServerError> {
        let encoded =
            serde_json::to_string(&request).map_err(|source| ServerError::InvalidJson {
                server: self.inner.server.clone(),
                source,
            })?;

        let mut writer = self.inner.writer.lock().await;
        let stream = writer.as_mut().ok_or_else(|| ServerError::NotRunning {
            server: self.inner.server.clone(),
        })?;

        let io_err = |err: std::io::Error| ServerError::Transport {
            server: self.inner.server.clone(),
            message: err.to_string(),
        };
        stream.write_all(encoded.as_bytes()).await.map_err(io_err)?;
        stream.write_all(b"\n").await.map_err(io_err)?;
        stream.flush().await.map_err(io_err)?;
        Ok(())
    }

    /// Terminates the child, waiting at most `grace` for it to be reaped.
    /// Safe to call more than once; later calls find no child.
    pub async fn shutdown(&self, grace: Duration) {
        {
            let mut writer = self.inner.writer.lock().await;
            *writer = None;
        }

        let child = {
            let mut slot = self.inner.child.lock().await;
            slot.take()
        };
        if let Some(mut child) = child {
            if let Err(err) = child.start_kill() {
                debug!(server = %self.inner.server, %err, "child already exited");
            }
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(server = %self.inner.server, ?status, "tool server stopped")
                }
                Ok(Err(err)) => {
                    warn!(server = %self.inner.server, %err, "failed to reap tool server")
                }
                Err(_) => {
                    warn!(server = %self.inner.server, "tool server ignored kill; abandoning");
                    let _ = child.kill().await;
                }
            }
        }

        self.inner.fail_pending().await;
    }
}

impl TransportInner {
    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(raw)) => {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(trimmed) {
                        Ok(value) => self.route(value).await,
                        Err(source) => {
                            warn!(
                                server = %self.server,
                                line = trimmed,
                                %source,
                                "received non-JSON line from tool server"
                            );
                        }
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }

        debug!(server = %self.server, "tool server stdout closed");
        self.fail_pending().await;
    }

    async fn route(&self, value: Value) {
        let Some(id) = value.get("id").and_then(Value::as_u64) else {
            // Notifications and server-initiated requests are ignored; this
            // client only ever issues tools/list and tools/call.
            debug!(server = %self.server, "ignoring message without numeric id");
            return;
        };

        let responder = {
            let mut pending = self.pending.lock().await;
            pending.remove(&id)
        };
        match responder {
            Some(sender) => {
                let _ = sender.send(value);
            }
            None => {
                debug!(server = %self.server, response_id = id, "response for unknown request");
            }
        }
    }

    fn unpack(&self, response: Value) -> Result<Value, ServerError> {
        if let Some(error) = response.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(ServerError::Rpc {
                server: self.server.clone(),
                code,
                message,
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn fail_pending(&self) {
        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            drop(sender);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // An `sh` loop that answers every request line with a canned tools/list
    // response stands in for a real MCP server.
    fn echo_server_script(response: &str) -> Vec<String> {
        vec![
            "-c".to_string(),
            format!("while read -r line; do echo '{response}'; done"),
        ]
    }

    #[tokio::test]
    async fn request_round_trips_over_pipes() {
        let response = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"tools": [{"name": "ping", "description": "Ping"}]}
        })
        .to_string();
        let transport = StdioTransport::spawn(
            "echo",
            "sh",
            &echo_server_script(&response),
            &HashMap::new(),
        )
        .await
        .expect("spawn echo server");

        let result = transport
            .request("tools/list", json!({}), Duration::from_secs(5))
            .await
            .expect("list tools");
        assert_eq!(
            result
                .get("tools")
                .and_then(Value::as_array)
                .map(|tools| tools.len()),
            Some(1)
        );

        transport.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn spawn_failure_is_a_typed_error() {
        let result = StdioTransport::spawn(
            "ghost",
            "/nonexistent/definitely-not-a-command",
            &[],
            &HashMap::new(),
        )
        .await;
        assert!(matches!(result, Err(ServerError::Spawn { .. })));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let transport = StdioTransport::spawn(
            "mute",
            "sh",
            &["-c".to_string(), "sleep 30".to_string()],
            &HashMap::new(),
        )
        .await
        .expect("spawn sleeper");

        let result = transport
            .request("tools/list", json!({}), Duration::from_millis(200))
            .await;
        assert!(matches!(result, Err(ServerError::Timeout { .. })));

        transport.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn shutdown_twice_is_harmless() {
        let transport = StdioTransport::spawn(
            "short",
            "sh",
            &["-c".to_string(), "sleep 30".to_string()],
            &HashMap::new(),
        )
        .await
        .expect("spawn sleeper");

        transport.shutdown(Duration::from_secs(2)).await;
        transport.shutdown(Duration::from_secs(2)).await;
    }
}
