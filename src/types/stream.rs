//! Streaming protocol events.

use serde::{Deserialize, Serialize};

use super::message::Role;
use super::usage::Usage;

/// A discrete event of the backend's streaming protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        role: Role,
    },
    ContentBlockStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_start: Option<ToolUseStart>,
    },
    ContentBlockDelta {
        delta: BlockDelta,
    },
    ContentBlockStop,
    MessageStop {
        stop_reason: StopReason,
    },
    /// Token accounting; may arrive anywhere inside an open message.
    Metadata {
        usage: Usage,
    },
}

impl StreamEvent {
    pub fn text_block_start() -> Self {
        Self::ContentBlockStart {
            tool_use_start: None,
        }
    }

    pub fn tool_use_block_start(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ContentBlockStart {
            tool_use_start: Some(ToolUseStart {
                id: id.into(),
                name: name.into(),
            }),
        }
    }

    pub fn text_delta(text: impl Into<String>) -> Self {
        Self::ContentBlockDelta {
            delta: BlockDelta::Text(text.into()),
        }
    }

    pub fn tool_input_delta(fragment: impl Into<String>) -> Self {
        Self::ContentBlockDelta {
            delta: BlockDelta::ToolInput(fragment.into()),
        }
    }
}

/// Identity of a tool-use block, sent when the block opens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolUseStart {
    pub id: String,
    pub name: String,
}

/// Incremental block content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockDelta {
    Text(String),
    ToolInput(String),
}

/// Why the model stopped producing output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    ContentFiltered,
    GuardrailIntervened,
    Other(String),
}

impl StopReason {
    /// Map a backend stop-reason string. Both snake_case and camelCase
    /// spellings are accepted.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "end_turn" | "endTurn" => Self::EndTurn,
            "tool_use" | "toolUse" => Self::ToolUse,
            "max_tokens" | "maxTokens" => Self::MaxTokens,
            "stop_sequence" | "stopSequence" => Self::StopSequence,
            "content_filtered" | "contentFiltered" => Self::ContentFiltered,
            "guardrail_intervened" | "guardrailIntervened" => Self::GuardrailIntervened,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EndTurn => "end_turn",
            Self::ToolUse => "tool_use",
            Self::MaxTokens => "max_tokens",
            Self::StopSequence => "stop_sequence",
            Self::ContentFiltered => "content_filtered",
            Self::GuardrailIntervened => "guardrail_intervened",
            Self::Other(other) => other.as_str(),
        };
        f.write_str(name)
    }
}
