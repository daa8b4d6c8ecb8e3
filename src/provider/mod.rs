//! Model backend trait and implementations.

pub mod http;

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(test)]
pub(crate) mod stub;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::HelmError;
use crate::types::{InferenceConfig, Message, StopReason, StreamEvent, Usage};

/// A request sent to a model backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub model_id: String,
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub tools: Vec<ToolDefinition>,
    pub inference: InferenceConfig,
}

/// Tool definition sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Complete response from the non-streaming variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ConverseOutput {
    pub message: Message,
    pub stop_reason: StopReason,
    pub usage: Option<Usage>,
}

/// Core trait implemented by model backends.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "anthropic").
    fn provider_name(&self) -> &str;

    /// Send a request and receive one complete message.
    async fn converse(&self, request: &ProviderRequest) -> Result<ConverseOutput, HelmError>;

    /// Send a request and receive the ordered protocol events of one message.
    async fn converse_stream(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent, HelmError>>, HelmError>;
}
