pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod security;

pub use application::registry::ToolRegistry;
pub use application::servers::ServerManager;
pub use application::session::{AgentSession, SessionError, SessionEvent};
pub use application::tools::{builtin_tools, LocalTool, ToolContext};
pub use config::{AgentConfig, ConfigError, ServerConfig, ServerTransport};
pub use domain::message::{
    ContentBlock, FinishReason, Message, Termination, ToolCallRequest, ToolResult,
};
pub use domain::tool::ToolDeclaration;
pub use infrastructure::model::{BackendRequest, BackendResponse, ModelBackend, ModelError};
pub use infrastructure::openai::OpenAiBackend;
pub use security::{CommandGate, GateDecision, PermissiveGate};
