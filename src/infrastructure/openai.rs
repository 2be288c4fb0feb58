use super::model::{BackendRequest, BackendResponse, ModelBackend, ModelError};
use crate::domain::message::{ContentBlock, FinishReason, Message, ToolCallRequest};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Hard ceiling on a single inference call. Long tool-heavy prompts can make
/// the backend think for minutes; past this point the turn is abandoned.
const API_TIMEOUT_SECS: u64 = 120;

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn wire_messages(messages: &[Message]) -> Vec<Value> {
        let mut wire = Vec::with_capacity(messages.len());
        for message in messages {
            match message {
                Message::System { content } => {
                    wire.push(json!({"role": "system", "content": content}));
                }
                Message::User { content } => {
                    wire.push(json!({"role": "user", "content": content}));
                }
                Message::Assistant { content } => {
                    let text = message.text();
                    let calls: Vec<Value> = content
                        .iter()
                        .filter_map(|block| match block {
                            ContentBlock::ToolCall(call) => Some(json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments,
                                },
                            })),
                            ContentBlock::Text(_) => None,
                        })
                        .collect();
                    let mut entry = json!({"role": "assistant", "content": text});
                    if !calls.is_empty() {
                        entry["tool_calls"] = Value::Array(calls);
                    }
                    wire.push(entry);
                }
                Message::Tool { results } => {
                    // The wire format wants one message per result.
                    for result in results {
                        wire.push(json!({
                            "role": "tool",
                            "tool_call_id": result.call_id,
                            "content": result.content,
                        }));
                    }
                }
            }
        }
        wire
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn complete(&self, request: BackendRequest) -> Result<BackendResponse, ModelError> {
        let mut body = json!({
            "model": request.model,
            "messages": Self::wire_messages(&request.messages),
            "temperature": request.temperature,
            "top_p": request.top_p,
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        },
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = Value::String("auto".to_string());
        }

        debug!(model = %request.model, messages = request.messages.len(), "requesting completion");
        let response = self
            .http
            .post(format!("{}{CHAT_COMPLETIONS_PATH}", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ModelError::Timeout(API_TIMEOUT_SECS)
                } else {
                    ModelError::Http(err)
                }
            })?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ModelError::Status { status, body: text });
        }

        let completion: Completion = serde_json::from_str(&text)?;
        let choice = completion.choices.into_iter().next().ok_or(ModelError::Empty)?;

        let mut content = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(ContentBlock::Text(text));
            }
        }
        for call in choice.message.tool_calls {
            content.push(ContentBlock::ToolCall(ToolCallRequest {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            }));
        }

        Ok(BackendResponse {
            message: Message::Assistant { content },
            finish_reason: FinishReason::from_wire(&choice.finish_reason),
        })
    }
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: String,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    /// Kept as the raw string from the wire; parsed only at execution time.
    arguments: String,
}
