//! TRELLIS Engine - Conversation Orchestration
//!
//! Runs the conversational loop that edits a project: assemble the prompt
//! from the current tree and recent history, call the model provider,
//! parse and resolve the reply, optionally take one retrieval hop, and
//! hand the outcome to persistence. The session registry keys this
//! machinery per project path and exposes the caller-facing surface.

pub mod context;
pub mod engine;
pub mod orchestrator;
pub mod sessions;

pub use context::{build_messages, simplify_tree, system_prompt, SimplifiedNode, HISTORY_WINDOW};
pub use engine::{ConversationEngine, HISTORY_CAP};
pub use orchestrator::{Orchestrator, StreamEvent, TurnResult};
pub use sessions::{SessionRegistry, TurnOutcome};
