use serde::{Deserialize, Serialize};

/// One entry in a session's conversation history.
///
/// History is an append-only ordered sequence owned exclusively by the
/// session; nothing mutates a message after it has been appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: String },
    User { content: String },
    Assistant { content: Vec<ContentBlock> },
    Tool { results: Vec<ToolResult> },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Tool-call requests carried by this message, empty for non-assistant roles.
    pub fn tool_calls(&self) -> Vec<&ToolCallRequest> {
        match self {
            Message::Assistant { content } => content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolCall(call) => Some(call),
                    ContentBlock::Text(_) => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Combined text content; tool calls and tool results contribute nothing.
    pub fn text(&self) -> String {
        match self {
            Message::Assistant { content } => content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text(text) => Some(text.as_str()),
                    ContentBlock::ToolCall(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Message::System { content } | Message::User { content } => content.clone(),
            Message::Tool { .. } => String::new(),
        }
    }
}

/// Ordered content item inside an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(String),
    ToolCall(ToolCallRequest),
}

/// A tool invocation requested by the model.
///
/// `arguments` carries the raw JSON payload exactly as the backend returned
/// it; it is parsed at execution time so a malformed payload degrades to an
/// error result for that one call instead of failing response conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Outcome of one tool call, correlated to its request by `call_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Why the backend stopped generating in the current turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    ToolCalls,
    Stop,
    Length,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// Maps a wire value to a finish reason. The GLM-flavoured backend
    /// reports content filtering as `sensitive` where OpenAI proper says
    /// `content_filter`; both are accepted.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "tool_calls" => FinishReason::ToolCalls,
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content_filter" | "sensitive" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// Absorbing end state of a session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Termination {
    /// The backend signalled normal completion (stop or length).
    Normal,
    /// The backend rejected the turn on content-policy grounds.
    Filtered,
    /// The turn budget ran out before the backend finished.
    Exhausted,
    /// The backend returned a finish signal the loop does not know.
    Anomaly,
}
