use crate::domain::message::{FinishReason, Message};
use crate::domain::tool::ToolDeclaration;
use async_trait::async_trait;
use thiserror::Error;

/// One inference round-trip: the full history plus the tool catalogue go up,
/// one assistant message and a finish signal come back.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDeclaration>,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub message: Message,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("model response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("model response carried no choices")]
    Empty,
    #[error("model did not respond within {0} seconds")]
    Timeout(u64),
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn complete(&self, request: BackendRequest) -> Result<BackendResponse, ModelError>;
}
