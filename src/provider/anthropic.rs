//! Anthropic Messages API backend.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::error::HelmError;
use crate::types::{
    ContentBlock, Message, Role, StopReason, StreamEvent, ToolInput, ToolUseBlock, Usage,
};

use super::http::{anthropic_headers, parse_sse_data, shared_client, status_to_error};
use super::{ConverseOutput, ModelProvider, ProviderRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.base_url.trim_end_matches('/'))
    }

    fn build_request_body(&self, request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter_map(|msg| {
                let content = build_anthropic_content(&msg.content);
                if content.is_empty() {
                    return None;
                }
                Some(serde_json::json!({
                    "role": msg.role.to_string(),
                    "content": content,
                }))
            })
            .collect();

        let mut body = serde_json::json!({
            "model": request.model_id,
            "messages": messages,
            "max_tokens": request.inference.max_tokens,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(ref system) = request.system_prompt {
                obj.insert("system".into(), system.clone().into());
            }
            if let Some(temp) = request.inference.temperature {
                obj.insert("temperature".into(), temp.into());
            }
            if let Some(top_p) = request.inference.top_p {
                obj.insert("top_p".into(), top_p.into());
            }
            if !request.tools.is_empty() {
                let tool_defs: Vec<serde_json::Value> = request
                    .tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.input_schema,
                        })
                    })
                    .collect();
                obj.insert("tools".into(), tool_defs.into());
            }
        }

        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, HelmError> {
        let resp = shared_client()
            .post(self.messages_url())
            .headers(anthropic_headers(&self.api_key, API_VERSION))
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    async fn converse(&self, request: &ProviderRequest) -> Result<ConverseOutput, HelmError> {
        let body = self.build_request_body(request, false);
        debug!(model = %request.model_id, "Anthropic converse");

        let data: AnthropicResponse = self.post(&body).await?.json().await?;

        let role = if data.role == "user" {
            Role::User
        } else {
            Role::Assistant
        };
        let mut message = Message::new(role);
        for block in data.content {
            match block.r#type.as_str() {
                "text" => message.content.push(ContentBlock::Text {
                    text: block.text.unwrap_or_default(),
                }),
                "tool_use" => message.content.push(ContentBlock::ToolUse(ToolUseBlock {
                    id: block.id.unwrap_or_default(),
                    name: block.name.unwrap_or_default(),
                    input: ToolInput::Structured(
                        block.input.unwrap_or_else(|| serde_json::json!({})),
                    ),
                })),
                _ => {}
            }
        }

        Ok(ConverseOutput {
            message,
            stop_reason: data
                .stop_reason
                .as_deref()
                .map(StopReason::from_wire)
                .unwrap_or(StopReason::EndTurn),
            usage: Some(Usage {
                input_tokens: data.usage.input_tokens,
                output_tokens: data.usage.output_tokens,
                total_tokens: data.usage.input_tokens + data.usage.output_tokens,
                cache_read_tokens: data.usage.cache_read_input_tokens,
                cache_write_tokens: data.usage.cache_creation_input_tokens,
            }),
        })
    }

    async fn converse_stream(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent, HelmError>>, HelmError> {
        let body = self.build_request_body(request, true);
        debug!(model = %request.model_id, "Anthropic converse_stream");

        let byte_stream = self.post(&body).await?.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut translator = SseTranslator::default();
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(HelmError::Network(e));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                    let line_bytes: Vec<u8> = buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&line_bytes);
                    let line = line.trim();
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = parse_sse_data(line) else {
                        continue;
                    };
                    let event = match serde_json::from_str::<serde_json::Value>(data) {
                        Ok(event) => event,
                        Err(e) => {
                            yield Err(HelmError::Protocol(format!("malformed SSE payload: {e}")));
                            return;
                        }
                    };
                    for item in translator.translate(&event) {
                        let failed = item.is_err();
                        yield item;
                        if failed {
                            return;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Maps Anthropic SSE payloads onto protocol events.
///
/// Block kinds other than text and tool_use (e.g. thinking) are skipped along
/// with their deltas.
#[derive(Debug, Default)]
struct SseTranslator {
    skipping_block: bool,
    stop_reason: Option<StopReason>,
}

impl SseTranslator {
    fn translate(&mut self, event: &serde_json::Value) -> Vec<Result<StreamEvent, HelmError>> {
        let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
        match event_type {
            "message_start" => {
                let message = event.get("message");
                let role = match message
                    .and_then(|m| m.get("role"))
                    .and_then(|r| r.as_str())
                {
                    Some("user") => Role::User,
                    _ => Role::Assistant,
                };
                let mut out = vec![Ok(StreamEvent::MessageStart { role })];
                if let Some(input_tokens) = message
                    .and_then(|m| m.get("usage"))
                    .and_then(|u| u.get("input_tokens"))
                    .and_then(|v| v.as_u64())
                {
                    out.push(Ok(StreamEvent::Metadata {
                        usage: Usage {
                            input_tokens: input_tokens as u32,
                            total_tokens: input_tokens as u32,
                            ..Default::default()
                        },
                    }));
                }
                out
            }
            "content_block_start" => {
                let block = event.get("content_block");
                let btype = block
                    .and_then(|b| b.get("type"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("");
                match btype {
                    "text" => {
                        self.skipping_block = false;
                        let mut out = vec![Ok(StreamEvent::text_block_start())];
                        if let Some(text) = block
                            .and_then(|b| b.get("text"))
                            .and_then(|t| t.as_str())
                            .filter(|t| !t.is_empty())
                        {
                            out.push(Ok(StreamEvent::text_delta(text)));
                        }
                        out
                    }
                    "tool_use" => {
                        self.skipping_block = false;
                        let field = |name: &str| {
                            block
                                .and_then(|b| b.get(name))
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string()
                        };
                        vec![Ok(StreamEvent::tool_use_block_start(field("id"), field("name")))]
                    }
                    _ => {
                        self.skipping_block = true;
                        Vec::new()
                    }
                }
            }
            "content_block_delta" => {
                if self.skipping_block {
                    return Vec::new();
                }
                let Some(delta) = event.get("delta") else {
                    return Vec::new();
                };
                match delta.get("type").and_then(|t| t.as_str()).unwrap_or("") {
                    "text_delta" => delta
                        .get("text")
                        .and_then(|t| t.as_str())
                        .map(|text| vec![Ok(StreamEvent::text_delta(text))])
                        .unwrap_or_default(),
                    "input_json_delta" => delta
                        .get("partial_json")
                        .and_then(|t| t.as_str())
                        .map(|json| vec![Ok(StreamEvent::tool_input_delta(json))])
                        .unwrap_or_default(),
                    _ => Vec::new(),
                }
            }
            "content_block_stop" => {
                if std::mem::take(&mut self.skipping_block) {
                    Vec::new()
                } else {
                    vec![Ok(StreamEvent::ContentBlockStop)]
                }
            }
            "message_delta" => {
                if let Some(stop) = event
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(|s| s.as_str())
                {
                    self.stop_reason = Some(StopReason::from_wire(stop));
                }
                event
                    .get("usage")
                    .and_then(|u| u.get("output_tokens"))
                    .and_then(|v| v.as_u64())
                    .map(|output_tokens| {
                        vec![Ok(StreamEvent::Metadata {
                            usage: Usage {
                                output_tokens: output_tokens as u32,
                                total_tokens: output_tokens as u32,
                                ..Default::default()
                            },
                        })]
                    })
                    .unwrap_or_default()
            }
            "message_stop" => vec![Ok(StreamEvent::MessageStop {
                stop_reason: self.stop_reason.take().unwrap_or(StopReason::EndTurn),
            })],
            "error" => {
                let error = event.get("error");
                let kind = error
                    .and_then(|e| e.get("type"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("");
                let message = error
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("stream error")
                    .to_string();
                let err = match kind {
                    "rate_limit_error" => HelmError::RateLimited(message),
                    "overloaded_error" => HelmError::api(529, message),
                    "authentication_error" | "permission_error" => {
                        HelmError::Authentication(message)
                    }
                    _ => HelmError::api(500, message),
                };
                vec![Err(err)]
            }
            _ => Vec::new(),
        }
    }
}

fn build_anthropic_content(blocks: &[ContentBlock]) -> Vec<serde_json::Value> {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => (!text.is_empty()).then(|| {
                serde_json::json!({
                    "type": "text",
                    "text": text,
                })
            }),
            ContentBlock::ToolUse(tool_use) => Some(serde_json::json!({
                "type": "tool_use",
                "id": tool_use.id,
                "name": tool_use.name,
                "input": tool_use.input.to_wire(),
            })),
            ContentBlock::ToolResult(result) => Some(serde_json::json!({
                "type": "tool_result",
                "tool_use_id": result.tool_use_id,
                "content": result.content_text(),
                "is_error": result.is_error(),
            })),
            ContentBlock::Image(image) => Some(serde_json::json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.format.mime_type(),
                    "data": image.to_base64(),
                }
            })),
        })
        .collect()
}

// Internal Anthropic response types

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    role: String,
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: Option<u32>,
    #[serde(default)]
    cache_creation_input_tokens: Option<u32>,
}
