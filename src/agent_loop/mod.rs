//! Conversation turn orchestration.

pub mod events;
pub mod runner;
pub mod types;

pub use events::{TurnEvent, TurnEventPayload, TurnEventSink};
pub use runner::{ConversationOrchestrator, OrchestratorConfig};
pub use types::{ConversationHistory, RunId};
