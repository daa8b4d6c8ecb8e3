//! The turn loop: request, parse, dispatch tools, repeat.

use std::sync::Arc;

use bon::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{HelmError, Result};
use crate::provider::ProviderRequest;
use crate::tools::ToolDispatcher;
use crate::transport::RetryingTransport;
use crate::types::{InferenceConfig, Message, ToolResultBlock};

use super::events::{TurnEventEmitter, TurnEventPayload, TurnEventSink};
use super::types::ConversationHistory;

/// Settings for one orchestrator.
#[derive(Debug, Clone, Builder)]
pub struct OrchestratorConfig {
    #[builder(into)]
    pub model_id: String,
    #[builder(default)]
    pub inference: InferenceConfig,
    /// Tool rounds allowed before the turn is cut off.
    #[builder(default = 25)]
    pub max_depth: usize,
    #[builder(default = true)]
    pub streaming: bool,
}

/// Drives conversation turns against a backend and a tool dispatcher.
pub struct ConversationOrchestrator {
    transport: RetryingTransport,
    dispatcher: Arc<ToolDispatcher>,
    config: OrchestratorConfig,
    event_sink: Option<TurnEventSink>,
}

impl ConversationOrchestrator {
    pub fn new(
        transport: RetryingTransport,
        dispatcher: Arc<ToolDispatcher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            config,
            event_sink: None,
        }
    }

    pub fn with_event_sink(mut self, sink: TurnEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    /// Run one user turn to completion.
    ///
    /// Appends every assistant message and tool-result message to `history`
    /// and returns the final assistant message. Tool failures are reported to
    /// the model as error results; transport and protocol failures end the
    /// turn with an error. When `max_depth` tool rounds pass without a final
    /// answer, a notice is appended and returned instead.
    pub async fn run_turn(
        &self,
        history: &mut ConversationHistory,
        system_prompt: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Message> {
        let run_id = Uuid::new_v4();
        let emitter = TurnEventEmitter::new(run_id, self.event_sink.clone());
        let span = info_span!("turn", %run_id, model = %self.config.model_id);

        let result = self
            .drive(history, system_prompt, cancel, &emitter)
            .instrument(span)
            .await;
        if let Err(e) = &result {
            emitter.emit(TurnEventPayload::Failed {
                error: e.to_string(),
            });
        }
        result
    }

    async fn drive(
        &self,
        history: &mut ConversationHistory,
        system_prompt: Option<&str>,
        cancel: &CancellationToken,
        emitter: &TurnEventEmitter,
    ) -> Result<Message> {
        let tools = self.dispatcher.definitions();
        let mut depth = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(HelmError::Canceled);
            }
            if depth > self.config.max_depth {
                warn!(max_depth = self.config.max_depth, "tool round limit reached");
                let notice = Message::assistant(format!(
                    "Stopped after {} tool rounds without a final answer.",
                    self.config.max_depth
                ));
                history.push(notice.clone());
                emitter.emit(TurnEventPayload::IterationLimit {
                    max_depth: self.config.max_depth,
                });
                return Ok(notice);
            }

            let request = ProviderRequest {
                model_id: self.config.model_id.clone(),
                messages: history.messages().to_vec(),
                system_prompt: system_prompt.map(str::to_string),
                tools: tools.clone(),
                inference: self.config.inference.clone(),
            };
            debug!(depth, messages = request.messages.len(), "requesting assistant turn");
            emitter.emit(TurnEventPayload::RequestStarted { depth });

            let turn = self
                .transport
                .complete(&request, self.config.streaming, cancel)
                .await?;
            history.push(turn.message.clone());
            emitter.emit(TurnEventPayload::AssistantMessage {
                message: turn.message.clone(),
                stop_reason: turn.stop_reason.clone(),
                usage: turn.usage.clone(),
            });

            if !turn.stop_reason.is_tool_use() {
                info!(depth, stop_reason = %turn.stop_reason, "turn complete");
                emitter.emit(TurnEventPayload::Completed {
                    stop_reason: turn.stop_reason,
                });
                return Ok(turn.message);
            }

            let tool_uses: Vec<_> = turn.message.tool_uses().into_iter().cloned().collect();
            if tool_uses.is_empty() {
                warn!(depth, "tool_use stop without tool requests; ending turn");
                emitter.emit(TurnEventPayload::Completed {
                    stop_reason: turn.stop_reason,
                });
                return Ok(turn.message);
            }

            let mut results = Vec::with_capacity(tool_uses.len());
            for tool_use in &tool_uses {
                if cancel.is_cancelled() {
                    results.push(ToolResultBlock::error(
                        &tool_use.id,
                        HelmError::Canceled.to_string(),
                    ));
                    continue;
                }
                emitter.emit(TurnEventPayload::ToolExecutionStart {
                    tool_use_id: tool_use.id.clone(),
                    tool_name: tool_use.name.clone(),
                    input: tool_use.input.clone(),
                });
                let result = self.dispatcher.dispatch_tool_use(tool_use, cancel).await;
                emitter.emit(TurnEventPayload::ToolExecutionEnd {
                    result: result.clone(),
                });
                results.push(result);
            }
            history.push(Message::tool_results(results));

            if cancel.is_cancelled() {
                return Err(HelmError::Canceled);
            }
            depth += 1;
        }
    }
}
