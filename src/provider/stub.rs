//! Scripted provider used by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream};

use crate::error::HelmError;
use crate::types::{Role, StopReason, StreamEvent};

use super::{ConverseOutput, ModelProvider, ProviderRequest};

/// What one backend call returns.
#[derive(Clone)]
pub(crate) enum Reply {
    Events(Vec<StreamEvent>),
    Fail(fn() -> HelmError),
}

/// Plays back `replies` in order; the last reply repeats once the script runs out.
pub(crate) struct StubProvider {
    replies: Vec<Reply>,
    calls: AtomicUsize,
    pub(crate) requests: Arc<Mutex<Vec<ProviderRequest>>>,
}

impl StubProvider {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies,
            calls: AtomicUsize::new(0),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self, request: &ProviderRequest) -> Reply {
        self.requests
            .lock()
            .expect("request lock")
            .push(request.clone());
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .get(index)
            .or_else(|| self.replies.last())
            .cloned()
            .expect("stub provider needs at least one reply")
    }
}

#[async_trait]
impl ModelProvider for StubProvider {
    fn provider_name(&self) -> &str {
        "stub"
    }

    async fn converse(&self, request: &ProviderRequest) -> Result<ConverseOutput, HelmError> {
        match self.next_reply(request) {
            Reply::Fail(make) => Err(make()),
            Reply::Events(events) => {
                let turn = crate::stream::collect_turn(
                    Box::pin(stream::iter(events.into_iter().map(Ok))),
                    &tokio_util::sync::CancellationToken::new(),
                )
                .await?;
                Ok(ConverseOutput {
                    message: turn.message,
                    stop_reason: turn.stop_reason,
                    usage: turn.usage,
                })
            }
        }
    }

    async fn converse_stream(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent, HelmError>>, HelmError> {
        match self.next_reply(request) {
            Reply::Fail(make) => Err(make()),
            Reply::Events(events) => Ok(Box::pin(stream::iter(events.into_iter().map(Ok)))),
        }
    }
}

pub(crate) fn text_reply(text: &str) -> Reply {
    Reply::Events(vec![
        StreamEvent::MessageStart {
            role: Role::Assistant,
        },
        StreamEvent::text_block_start(),
        StreamEvent::text_delta(text),
        StreamEvent::ContentBlockStop,
        StreamEvent::MessageStop {
            stop_reason: StopReason::EndTurn,
        },
    ])
}

/// One assistant message requesting each `(id, name, raw_input)` in order.
pub(crate) fn tool_use_reply(calls: &[(&str, &str, &str)]) -> Reply {
    let mut events = vec![StreamEvent::MessageStart {
        role: Role::Assistant,
    }];
    for (id, name, input) in calls {
        events.push(StreamEvent::tool_use_block_start(*id, *name));
        events.push(StreamEvent::tool_input_delta(*input));
        events.push(StreamEvent::ContentBlockStop);
    }
    events.push(StreamEvent::MessageStop {
        stop_reason: StopReason::ToolUse,
    });
    Reply::Events(events)
}

/// A stream that ends without `MessageStop`.
pub(crate) fn truncated_reply() -> Reply {
    Reply::Events(vec![
        StreamEvent::MessageStart {
            role: Role::Assistant,
        },
        StreamEvent::text_block_start(),
        StreamEvent::text_delta("partial"),
    ])
}

pub(crate) fn rate_limited() -> HelmError {
    HelmError::RateLimited("slow down".to_string())
}

pub(crate) fn server_error() -> HelmError {
    HelmError::api(500, "boom")
}
