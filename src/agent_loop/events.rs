//! Turn progress events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Message, StopReason, ToolInput, ToolResultBlock, Usage};

use super::types::RunId;

/// Callback receiving turn events.
pub type TurnEventSink = Arc<dyn Fn(TurnEvent) + Send + Sync>;

/// Event payloads emitted by the orchestrator.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEventPayload {
    RequestStarted {
        depth: usize,
    },
    AssistantMessage {
        message: Message,
        stop_reason: StopReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    ToolExecutionStart {
        tool_use_id: String,
        tool_name: String,
        input: ToolInput,
    },
    ToolExecutionEnd {
        result: ToolResultBlock,
    },
    IterationLimit {
        max_depth: usize,
    },
    Completed {
        stop_reason: StopReason,
    },
    Failed {
        error: String,
    },
}

/// Envelope with ordering information.
#[derive(Debug, Clone, Serialize)]
pub struct TurnEvent {
    pub run_id: RunId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: TurnEventPayload,
}

pub(crate) struct TurnEventEmitter {
    run_id: RunId,
    seq: AtomicU64,
    sink: Option<TurnEventSink>,
}

impl TurnEventEmitter {
    pub(crate) fn new(run_id: RunId, sink: Option<TurnEventSink>) -> Self {
        Self {
            run_id,
            seq: AtomicU64::new(1),
            sink,
        }
    }

    pub(crate) fn emit(&self, payload: TurnEventPayload) {
        let Some(sink) = &self.sink else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        (sink)(TurnEvent {
            run_id: self.run_id,
            seq,
            timestamp: Utc::now(),
            payload,
        });
    }
}
