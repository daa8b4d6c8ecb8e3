//! Tool handlers and dispatch.

pub mod arguments;
pub mod builtin;
pub mod command;
pub mod dispatcher;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use command::ExecuteCommandTool;
pub use dispatcher::ToolDispatcher;
pub use tool::{FnTool, ToolContext, ToolHandler, ToolName};
pub use types::ToolParameters;
