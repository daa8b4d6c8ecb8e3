//! Stream reconstruction.

pub mod parser;

pub use parser::{collect_turn, ParsedTurn, StreamEventParser, ToolUseAccumulator};
