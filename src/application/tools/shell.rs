use super::{error_value, require_str, LocalTool, ToolContext};
use crate::domain::tool::ToolDeclaration;
use crate::security::GateDecision;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 300;

fn preview(command: &str) -> String {
    command.chars().take(100).collect()
}

pub struct BashTool;

#[async_trait]
impl LocalTool for BashTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "Bash",
            "Execute a bash command in the working directory",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Bash command to execute"
                    },
                    "timeout": {
                        "type": "integer",
                        "description": "Timeout in seconds (default: 300)"
                    }
                },
                "required": ["command"]
            }),
        )
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> Value {
        let command = match require_str(&args, "command") {
            Ok(value) => value,
            Err(error) => return error,
        };
        let timeout_secs = args
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        // The gate is consulted before anything is spawned; a rejected
        // command never reaches the shell.
        match ctx.gate.as_deref() {
            Some(gate) => {
                if let GateDecision::Block(reason) = gate.evaluate(command) {
                    warn!(command = preview(command).as_str(), %reason, "command blocked");
                    return json!({
                        "error": format!("command blocked by security policy: {reason}"),
                        "command": command,
                        "blocked": true,
                    });
                }
            }
            None => warn!("no command gate configured; validation skipped"),
        }

        info!(command = preview(command).as_str(), "executing shell command");

        let child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(err) => return error_value(format!("failed to spawn shell: {err}")),
        };

        let output = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await;

        match output {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                info!(exit_code, "shell command finished");
                json!({
                    "stdout": String::from_utf8_lossy(&output.stdout).into_owned(),
                    "stderr": String::from_utf8_lossy(&output.stderr).into_owned(),
                    "exit_code": exit_code,
                    "command": command,
                    "success": output.status.success(),
                })
            }
            Ok(Err(err)) => error_value(format!("command execution failed: {err}")),
            // kill_on_drop reaps the child when the future is dropped here.
            Err(_) => {
                warn!(timeout_secs, "shell command timed out");
                json!({
                    "error": format!("command timed out after {timeout_secs} seconds"),
                    "command": command,
                    "timeout": true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::CommandGate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct DenyAllGate {
        consulted: AtomicUsize,
    }

    impl CommandGate for DenyAllGate {
        fn evaluate(&self, _command: &str) -> GateDecision {
            self.consulted.fetch_add(1, Ordering::SeqCst);
            GateDecision::Block("command not in allow-list".to_string())
        }
    }

    #[tokio::test]
    async fn blocked_command_is_never_executed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gate = Arc::new(DenyAllGate {
            consulted: AtomicUsize::new(0),
        });
        let ctx = ToolContext::new(dir.path().to_path_buf()).with_gate(gate.clone());

        let marker = dir.path().join("executed");
        let result = BashTool
            .run(
                json!({"command": format!("touch {}", marker.display())}),
                &ctx,
            )
            .await;

        assert_eq!(result.get("blocked"), Some(&Value::Bool(true)));
        assert!(result.get("error").is_some());
        assert_eq!(gate.consulted.load(Ordering::SeqCst), 1);
        assert!(!marker.exists(), "blocked command must not spawn a process");
    }

    #[tokio::test]
    async fn permissive_gate_lets_commands_through() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ToolContext::new(dir.path().to_path_buf())
            .with_gate(Arc::new(crate::security::PermissiveGate));

        let result = BashTool.run(json!({"command": "echo allowed"}), &ctx).await;
        assert_eq!(result.get("success"), Some(&Value::Bool(true)));
        let stdout = result.get("stdout").and_then(Value::as_str).unwrap_or("");
        assert_eq!(stdout.trim(), "allowed");
    }

    #[tokio::test]
    async fn command_runs_in_working_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ToolContext::new(dir.path().to_path_buf());

        let result = BashTool.run(json!({"command": "pwd"}), &ctx).await;
        assert_eq!(result.get("success"), Some(&Value::Bool(true)));
        let stdout = result.get("stdout").and_then(Value::as_str).unwrap_or("");
        let expected = dir
            .path()
            .canonicalize()
            .expect("canonical tempdir")
            .display()
            .to_string();
        assert_eq!(stdout.trim(), expected);
    }

    #[tokio::test]
    async fn timeout_is_reported_as_error_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ToolContext::new(dir.path().to_path_buf());

        let result = BashTool
            .run(json!({"command": "sleep 5", "timeout": 1}), &ctx)
            .await;
        assert_eq!(result.get("timeout"), Some(&Value::Bool(true)));
        assert!(result.get("error").is_some());
    }

    #[tokio::test]
    async fn missing_command_is_an_error_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ToolContext::new(dir.path().to_path_buf());
        let result = BashTool.run(json!({}), &ctx).await;
        assert!(result.get("error").is_some());
    }
}
