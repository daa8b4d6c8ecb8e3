//! Incremental reconstruction of one message from protocol events.

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{HelmError, Result};
use crate::types::{
    BlockDelta, ContentBlock, Message, StopReason, StreamEvent, ToolInput, ToolUseBlock,
    ToolUseStart, Usage,
};

/// A fully parsed assistant turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTurn {
    pub message: Message,
    pub stop_reason: StopReason,
    pub usage: Option<Usage>,
}

/// Tool-use block under construction. Lives for one block span.
#[derive(Debug, Clone)]
pub struct ToolUseAccumulator {
    id: String,
    name: String,
    raw_input: String,
}

impl ToolUseAccumulator {
    fn new(start: ToolUseStart) -> Self {
        Self {
            id: start.id,
            name: start.name,
            raw_input: String::new(),
        }
    }

    fn finish(self) -> ToolUseBlock {
        let input = ToolInput::parse(&self.raw_input);
        if let ToolInput::Raw(_) = input {
            tracing::warn!(
                tool_use_id = %self.id,
                tool = %self.name,
                "tool input is not valid JSON; keeping raw text"
            );
        }
        ToolUseBlock {
            id: self.id,
            name: self.name,
            input,
        }
    }
}

#[derive(Debug)]
enum OpenBlock {
    Text(String),
    ToolUse(ToolUseAccumulator),
}

impl OpenBlock {
    fn close(self) -> ContentBlock {
        match self {
            Self::Text(text) => ContentBlock::Text { text },
            Self::ToolUse(acc) => ContentBlock::ToolUse(acc.finish()),
        }
    }
}

#[derive(Debug)]
enum ParserState {
    Idle,
    MessageOpen(Message),
    BlockOpen { message: Message, block: OpenBlock },
    Closed,
}

/// Consumes [`StreamEvent`]s sequentially and yields one [`ParsedTurn`].
///
/// States run `Idle -> MessageOpen -> (BlockOpen)* -> Closed`. Protocol
/// violations return [`HelmError::Protocol`] and leave the parser closed.
#[derive(Debug)]
pub struct StreamEventParser {
    state: ParserState,
    usage: Option<Usage>,
}

impl Default for StreamEventParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamEventParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Idle,
            usage: None,
        }
    }

    /// Whether a message has been sealed.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, ParserState::Closed)
    }

    /// Feed one event. Returns the finished turn on `MessageStop`.
    pub fn feed(&mut self, event: StreamEvent) -> Result<Option<ParsedTurn>> {
        let state = std::mem::replace(&mut self.state, ParserState::Closed);
        let (next, finished) = self.transition(state, event)?;
        self.state = next;
        Ok(finished)
    }

    fn transition(
        &mut self,
        state: ParserState,
        event: StreamEvent,
    ) -> Result<(ParserState, Option<ParsedTurn>)> {
        match (state, event) {
            (state, StreamEvent::Metadata { usage }) => {
                if matches!(state, ParserState::Idle | ParserState::Closed) {
                    return Err(protocol("metadata outside of an open message"));
                }
                self.usage.get_or_insert_with(Usage::default).merge(&usage);
                Ok((state, None))
            }

            (ParserState::Idle, StreamEvent::MessageStart { role }) => {
                Ok((ParserState::MessageOpen(Message::new(role)), None))
            }
            (ParserState::Idle, StreamEvent::MessageStop { .. }) => {
                Err(protocol("message_stop without message_start"))
            }
            (ParserState::Idle, other) => Err(protocol(format!(
                "{} before message_start",
                event_name(&other)
            ))),

            (
                ParserState::MessageOpen(message),
                StreamEvent::ContentBlockStart { tool_use_start },
            ) => {
                let block = match tool_use_start {
                    Some(start) => OpenBlock::ToolUse(ToolUseAccumulator::new(start)),
                    None => OpenBlock::Text(String::new()),
                };
                Ok((ParserState::BlockOpen { message, block }, None))
            }
            (ParserState::MessageOpen(message), StreamEvent::ContentBlockDelta { delta }) => {
                match delta {
                    BlockDelta::Text(text) => Ok((
                        ParserState::BlockOpen {
                            message,
                            block: OpenBlock::Text(text),
                        },
                        None,
                    )),
                    BlockDelta::ToolInput(_) => {
                        Err(protocol("tool input delta without an open tool-use block"))
                    }
                }
            }
            (ParserState::MessageOpen(_), StreamEvent::ContentBlockStop) => {
                Err(protocol("content_block_stop without an open block"))
            }
            (ParserState::MessageOpen(message), StreamEvent::MessageStop { stop_reason }) => {
                Ok((ParserState::Closed, Some(self.seal(message, stop_reason))))
            }
            (ParserState::MessageOpen(_), StreamEvent::MessageStart { .. }) => {
                Err(protocol("message_start while a message is open"))
            }

            (
                ParserState::BlockOpen { message, block },
                StreamEvent::ContentBlockDelta { delta },
            ) => {
                let block = match (block, delta) {
                    (OpenBlock::Text(mut buffer), BlockDelta::Text(text)) => {
                        buffer.push_str(&text);
                        OpenBlock::Text(buffer)
                    }
                    (OpenBlock::ToolUse(mut acc), BlockDelta::ToolInput(fragment)) => {
                        acc.raw_input.push_str(&fragment);
                        OpenBlock::ToolUse(acc)
                    }
                    (OpenBlock::Text(_), BlockDelta::ToolInput(_)) => {
                        return Err(protocol("tool input delta inside a text block"));
                    }
                    (OpenBlock::ToolUse(_), BlockDelta::Text(_)) => {
                        return Err(protocol("text delta inside a tool-use block"));
                    }
                };
                Ok((ParserState::BlockOpen { message, block }, None))
            }
            (ParserState::BlockOpen { mut message, block }, StreamEvent::ContentBlockStop) => {
                message.content.push(block.close());
                Ok((ParserState::MessageOpen(message), None))
            }
            (
                ParserState::BlockOpen { mut message, block },
                StreamEvent::MessageStop { stop_reason },
            ) => {
                tracing::debug!("message_stop with an unterminated block; flushing it");
                message.content.push(block.close());
                Ok((ParserState::Closed, Some(self.seal(message, stop_reason))))
            }
            (ParserState::BlockOpen { .. }, StreamEvent::ContentBlockStart { .. }) => {
                Err(protocol("content_block_start while a block is open"))
            }
            (ParserState::BlockOpen { .. }, StreamEvent::MessageStart { .. }) => {
                Err(protocol("message_start while a block is open"))
            }

            (ParserState::Closed, other) => Err(protocol(format!(
                "{} after message_stop",
                event_name(&other)
            ))),
        }
    }

    fn seal(&mut self, message: Message, stop_reason: StopReason) -> ParsedTurn {
        ParsedTurn {
            message,
            stop_reason,
            usage: self.usage.take(),
        }
    }
}

/// Drain `stream` through a fresh parser until the message is sealed.
///
/// Events after `MessageStop` are ignored. A stream that ends early is a
/// protocol error; cancellation aborts the read.
pub async fn collect_turn(
    mut stream: BoxStream<'static, Result<StreamEvent>>,
    cancel: &CancellationToken,
) -> Result<ParsedTurn> {
    let mut parser = StreamEventParser::new();
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(HelmError::Canceled),
            next = stream.next() => next,
        };
        let Some(event) = next else {
            return Err(protocol("stream ended before message_stop"));
        };
        if let Some(turn) = parser.feed(event?)? {
            return Ok(turn);
        }
    }
}

fn protocol(message: impl Into<String>) -> HelmError {
    HelmError::Protocol(message.into())
}

fn event_name(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::MessageStart { .. } => "message_start",
        StreamEvent::ContentBlockStart { .. } => "content_block_start",
        StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
        StreamEvent::ContentBlockStop => "content_block_stop",
        StreamEvent::MessageStop { .. } => "message_stop",
        StreamEvent::Metadata { .. } => "metadata",
    }
}
