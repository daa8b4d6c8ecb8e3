//! Convenience re-exports for common use.

pub use crate::agent_loop::{
    ConversationHistory, ConversationOrchestrator, OrchestratorConfig, TurnEvent,
    TurnEventPayload,
};
pub use crate::command::{AllowlistConfig, CommandExecutionEngine, CommandOutput, EngineConfig};
pub use crate::config::HelmConfig;
pub use crate::error::{HelmError, Result};
pub use crate::provider::ModelProvider;
pub use crate::tools::{ToolArguments, ToolDispatcher, ToolHandler, ToolName};
pub use crate::transport::RetryingTransport;
pub use crate::types::{
    ContentBlock, InferenceConfig, Message, Role, StopReason, ToolInput, ToolResultBlock,
    ToolUseBlock, Usage,
};
pub use crate::util::retry::RetryPolicy;
