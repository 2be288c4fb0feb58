use crate::application::registry::ToolRegistry;
use crate::application::servers::ServerManager;
use crate::application::tools::ToolContext;
use crate::config::AgentConfig;
use crate::domain::message::{FinishReason, Message, Termination, ToolCallRequest, ToolResult};
use crate::domain::tool::ToolDeclaration;
use crate::infrastructure::model::{BackendRequest, ModelBackend, ModelError};
use crate::security::CommandGate;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("no prompt has been submitted")]
    NoPendingWork,
    #[error("session has already terminated")]
    AlreadyTerminated,
}

/// What the session loop produced on one `next_event` call.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Assistant { message: Message },
    ToolResults { results: Vec<ToolResult> },
    Ended { termination: Termination },
}

#[derive(Debug)]
enum SessionState {
    Idle,
    AwaitingModel,
    ExecutingTools(Vec<ToolCallRequest>),
    Terminated(Termination),
}

/// The turn-taking loop between the model backend and the tool layer.
///
/// The caller drives the loop: `submit` a prompt, then pull `next_event`
/// until `Ended` arrives. Each pull performs at most one blocking operation,
/// either a backend round-trip or one batch of tool executions.
pub struct AgentSession {
    config: AgentConfig,
    backend: Arc<dyn ModelBackend>,
    registry: ToolRegistry,
    servers: ServerManager,
    ctx: ToolContext,
    history: Vec<Message>,
    state: SessionState,
    turns_used: usize,
}

impl AgentSession {
    pub fn new(
        config: AgentConfig,
        backend: Arc<dyn ModelBackend>,
        gate: Option<Arc<dyn CommandGate>>,
    ) -> Self {
        let registry = if config.allowed_tools.is_empty() {
            ToolRegistry::all()
        } else {
            ToolRegistry::with_allowed(&config.allowed_tools)
        };
        let mut ctx = ToolContext::new(config.cwd.clone());
        if let Some(gate) = gate {
            ctx = ctx.with_gate(gate);
        }
        let servers = ServerManager::new(config.servers.clone());

        let mut history = Vec::new();
        if let Some(prompt) = &config.system_prompt {
            history.push(Message::system(prompt.clone()));
        }

        Self {
            config,
            backend,
            registry,
            servers,
            ctx,
            history,
            state: SessionState::Idle,
            turns_used: 0,
        }
    }

    /// Spawns the configured tool servers and discovers their catalogues.
    /// Servers that fail stay out of the catalogue without failing the call.
    pub async fn start(&mut self) {
        self.servers.start_all().await;
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Queues a user prompt. Only valid before the session terminates.
    pub fn submit(&mut self, prompt: impl Into<String>) -> Result<(), SessionError> {
        if matches!(self.state, SessionState::Terminated(_)) {
            return Err(SessionError::AlreadyTerminated);
        }
        self.history.push(Message::user(prompt));
        self.state = SessionState::AwaitingModel;
        Ok(())
    }

    /// Advances the loop by one step.
    pub async fn next_event(&mut self) -> Result<SessionEvent, SessionError> {
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Idle => {
                self.state = SessionState::Idle;
                Err(SessionError::NoPendingWork)
            }
            SessionState::Terminated(termination) => {
                self.state = SessionState::Terminated(termination);
                Ok(SessionEvent::Ended { termination })
            }
            SessionState::AwaitingModel => self.model_step().await,
            SessionState::ExecutingTools(calls) => Ok(self.tool_step(calls).await),
        }
    }

    async fn model_step(&mut self) -> Result<SessionEvent, SessionError> {
        if self.turns_used >= self.config.max_turns {
            warn!(max_turns = self.config.max_turns, "turn budget exhausted");
            self.state = SessionState::Terminated(Termination::Exhausted);
            return Ok(SessionEvent::Ended {
                termination: Termination::Exhausted,
            });
        }

        let mut tools = self.registry.declarations();
        tools.extend(self.servers.declarations());

        let request = BackendRequest {
            model: self.config.model.clone(),
            messages: self.history.clone(),
            tools,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
        };
        let response = match self.backend.complete(request).await {
            Ok(response) => response,
            Err(err) => {
                self.state = SessionState::Terminated(Termination::Anomaly);
                return Err(SessionError::Model(err));
            }
        };
        self.turns_used += 1;

        let calls: Vec<ToolCallRequest> = response
            .message
            .tool_calls()
            .into_iter()
            .cloned()
            .collect();
        self.history.push(response.message.clone());

        self.state = match response.finish_reason {
            FinishReason::ToolCalls if !calls.is_empty() => SessionState::ExecutingTools(calls),
            FinishReason::ToolCalls => {
                warn!("backend signalled tool calls but sent none");
                SessionState::Terminated(Termination::Anomaly)
            }
            FinishReason::Stop | FinishReason::Length => {
                SessionState::Terminated(Termination::Normal)
            }
            FinishReason::ContentFilter => SessionState::Terminated(Termination::Filtered),
            FinishReason::Other(ref reason) => {
                warn!(%reason, "backend returned an unrecognized finish reason");
                SessionState::Terminated(Termination::Anomaly)
            }
        };

        Ok(SessionEvent::Assistant {
            message: response.message,
        })
    }

    /// Runs one batch of tool calls to completion, in request order. Every
    /// call produces a result; failures become error results, never faults.
    async fn tool_step(&mut self, calls: Vec<ToolCallRequest>) -> SessionEvent {
        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            info!(tool = %call.name, call_id = %call.id, "executing tool call");
            results.push(self.execute_call(call).await);
        }
        self.history.push(Message::Tool {
            results: results.clone(),
        });
        self.state = SessionState::AwaitingModel;
        SessionEvent::ToolResults { results }
    }

    async fn execute_call(&self, call: &ToolCallRequest) -> ToolResult {
        if ToolDeclaration::is_remote(&call.name) {
            let arguments = if call.arguments.trim().is_empty() {
                json!({})
            } else {
                match serde_json::from_str(&call.arguments) {
                    Ok(value) => value,
                    Err(err) => {
                        return ToolResult::error(
                            &call.id,
                            json!({"error": format!("invalid JSON arguments: {err}")}).to_string(),
                        );
                    }
                }
            };
            return match self.servers.call(&call.name, arguments).await {
                Ok(text) => ToolResult::ok(&call.id, text),
                Err(err) => ToolResult::error(
                    &call.id,
                    json!({"error": err.to_string()}).to_string(),
                ),
            };
        }

        let value = self
            .registry
            .execute(&call.name, &call.arguments, &self.ctx)
            .await;
        let is_error = value.get("error").is_some();
        let result = ToolResult {
            call_id: call.id.clone(),
            content: value.to_string(),
            is_error,
        };
        if is_error {
            warn!(tool = %call.name, call_id = %call.id, "tool call returned an error result");
        }
        result
    }

    /// Tears down the tool servers. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.servers.shutdown().await;
    }

    /// Drives a single prompt to termination, reporting each event through
    /// `on_event`. Servers are shut down before returning, on every path.
    pub async fn run(
        &mut self,
        prompt: impl Into<String>,
        mut on_event: impl FnMut(&SessionEvent),
    ) -> Result<Termination, SessionError> {
        if let Err(err) = self.submit(prompt) {
            self.shutdown().await;
            return Err(err);
        }
        loop {
            match self.next_event().await {
                Ok(SessionEvent::Ended { termination }) => {
                    on_event(&SessionEvent::Ended { termination });
                    self.shutdown().await;
                    return Ok(termination);
                }
                Ok(event) => on_event(&event),
                Err(err) => {
                    self.shutdown().await;
                    return Err(err);
                }
            }
        }
    }
}
