//! Shared test helpers and scripted provider.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};

use helm::error::HelmError;
use helm::provider::{ConverseOutput, ModelProvider, ProviderRequest};
use helm::types::*;

/// A provider that streams queued responses and records every request.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Vec<StreamEvent>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a final text answer.
    pub fn queue_text(&self, text: &str) {
        self.responses.lock().unwrap().push_back(vec![
            StreamEvent::MessageStart {
                role: Role::Assistant,
            },
            StreamEvent::text_block_start(),
            StreamEvent::text_delta(text),
            StreamEvent::ContentBlockStop,
            StreamEvent::Metadata {
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 20,
                    total_tokens: 30,
                    ..Default::default()
                },
            },
            StreamEvent::MessageStop {
                stop_reason: StopReason::EndTurn,
            },
        ]);
    }

    /// Queue a message requesting one tool, with its input split across two deltas.
    pub fn queue_tool_use(&self, id: &str, name: &str, input: serde_json::Value) {
        let raw = input.to_string();
        let (head, tail) = raw.split_at(raw.len() / 2);
        self.responses.lock().unwrap().push_back(vec![
            StreamEvent::MessageStart {
                role: Role::Assistant,
            },
            StreamEvent::tool_use_block_start(id, name),
            StreamEvent::tool_input_delta(head),
            StreamEvent::tool_input_delta(tail),
            StreamEvent::ContentBlockStop,
            StreamEvent::MessageStop {
                stop_reason: StopReason::ToolUse,
            },
        ]);
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &ProviderRequest) -> Result<Vec<StreamEvent>, HelmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| HelmError::api(500, "script exhausted"))
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn converse(&self, _request: &ProviderRequest) -> Result<ConverseOutput, HelmError> {
        Err(HelmError::UnsupportedOperation(
            "scripted provider only streams".to_string(),
        ))
    }

    async fn converse_stream(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent, HelmError>>, HelmError> {
        let events = self.next(request)?;
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }
}
