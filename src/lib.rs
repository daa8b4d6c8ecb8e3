//! helm: an agentic tool-use engine.
//!
//! A [`ConversationOrchestrator`](agent_loop::ConversationOrchestrator) sends
//! the conversation to a model backend, streams back the assistant message,
//! runs any requested tools through a [`ToolDispatcher`](tools::ToolDispatcher)
//! and feeds the results back until the model produces a final answer.
//! Shell commands requested by the model go through an allow-listed
//! [`CommandExecutionEngine`](command::CommandExecutionEngine).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use helm::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> helm::error::Result<()> {
//! let config = HelmConfig::load(None)?;
//! let provider = Arc::new(config.anthropic_provider()?);
//! let transport = RetryingTransport::new(provider, config.retry.clone());
//! let engine = Arc::new(CommandExecutionEngine::new(config.command.clone()));
//! let dispatcher = Arc::new(ToolDispatcher::with_builtins(".", engine));
//! let orchestrator =
//!     ConversationOrchestrator::new(transport, dispatcher, config.orchestrator_config());
//!
//! let mut history = ConversationHistory::new();
//! history.push(Message::user("What is in this directory?"));
//! let reply = orchestrator
//!     .run_turn(&mut history, None, &CancellationToken::new())
//!     .await?;
//! println!("{}", reply.text_content());
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod command;
pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod stream;
pub mod tools;
pub mod transport;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
