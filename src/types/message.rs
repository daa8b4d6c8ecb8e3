//! Message types exchanged with the model backend.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::HelmError;

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Create an empty message for `role`.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            content: Vec::new(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a user message carrying the results of one round of tool calls.
    pub fn tool_results(results: Vec<ToolResultBlock>) -> Self {
        Self {
            role: Role::User,
            content: results.into_iter().map(ContentBlock::ToolResult).collect(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a user message with image content.
    pub fn user_with_image(text: impl Into<String>, image: ImageBlock) -> Self {
        Self {
            role: Role::User,
            content: vec![
                ContentBlock::Text { text: text.into() },
                ContentBlock::Image(image),
            ],
            timestamp: Some(Utc::now()),
        }
    }

    /// Assistant notice shown in place of a response whose turn was aborted.
    pub fn turn_failed(error: &HelmError) -> Self {
        Self::assistant(format!("Request failed: {error}"))
    }

    /// Extract the text content, concatenating all text blocks.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Tool-use requests in emission order.
    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse(tool_use) => Some(tool_use),
                _ => None,
            })
            .collect()
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single unit of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
    Image(ImageBlock),
}

/// Tool input as received from the model.
///
/// Streamed tool input is reassembled from fragments; when the result is not
/// valid JSON the raw text is kept so the block is never dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolInput {
    Structured(serde_json::Value),
    Raw(String),
}

impl ToolInput {
    /// Parse a buffered input string. Empty input means "no arguments".
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::Structured(serde_json::json!({}));
        }
        match serde_json::from_str(raw) {
            Ok(value) => Self::Structured(value),
            Err(_) => Self::Raw(raw.to_string()),
        }
    }

    /// The structured value, if parsing succeeded.
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// JSON representation used on the wire.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Self::Structured(value) => value.clone(),
            Self::Raw(raw) => serde_json::json!({ "raw_input": raw }),
        }
    }
}

impl From<serde_json::Value> for ToolInput {
    fn from(value: serde_json::Value) -> Self {
        Self::Structured(value)
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: ToolInput,
}

/// Outcome of a tool invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolResultStatus {
    Success,
    Error,
}

/// One piece of tool result content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultContent {
    Text(String),
    Json(serde_json::Value),
}

/// The result of a tool invocation, sent back to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub status: ToolResultStatus,
    pub content: Vec<ToolResultContent>,
}

impl ToolResultBlock {
    pub fn success(tool_use_id: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            status: ToolResultStatus::Success,
            content: vec![ToolResultContent::Json(value)],
        }
    }

    pub fn error(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            status: ToolResultStatus::Error,
            content: vec![ToolResultContent::Text(message.into())],
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolResultStatus::Error
    }

    /// Flatten the content into a single string.
    pub fn content_text(&self) -> String {
        self.content
            .iter()
            .map(|part| match part {
                ToolResultContent::Text(text) => text.clone(),
                ToolResultContent::Json(value) => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Supported image encodings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }
}

/// Image content embedded in a message. Bytes serialize as base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageBlock {
    pub format: ImageFormat,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

impl ImageBlock {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_input_parse_keeps_raw_text_on_invalid_json() {
        assert_eq!(
            ToolInput::parse("{\"path\": \"a\""),
            ToolInput::Raw("{\"path\": \"a\"".to_string())
        );
    }

    #[test]
    fn tool_input_parse_treats_empty_buffer_as_empty_object() {
        assert_eq!(ToolInput::parse("  "), ToolInput::Structured(serde_json::json!({})));
    }

    #[test]
    fn tool_uses_preserve_emission_order() {
        let message = Message {
            role: Role::Assistant,
            content: vec![
                ContentBlock::ToolUse(ToolUseBlock {
                    id: "b".into(),
                    name: "read_files".into(),
                    input: serde_json::json!({}).into(),
                }),
                ContentBlock::Text { text: "between".into() },
                ContentBlock::ToolUse(ToolUseBlock {
                    id: "a".into(),
                    name: "list_files".into(),
                    input: serde_json::json!({}).into(),
                }),
            ],
            timestamp: None,
        };

        let ids: Vec<&str> = message.tool_uses().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn image_bytes_serialize_as_base64() {
        let image = ImageBlock {
            format: ImageFormat::Png,
            bytes: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["bytes"], "AQID");
        let back: ImageBlock = serde_json::from_value(json).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn turn_failed_renders_error_text() {
        let message = Message::turn_failed(&HelmError::RateLimited("slow down".into()));
        assert_eq!(message.role, Role::Assistant);
        assert!(message.text_content().contains("slow down"));
    }
}
