//! One user turn, end to end.
//!
//! The orchestrator drives the per-turn state machine: build the prompt
//! from the pre-turn tree and history, run a provider pass, parse the
//! reply, optionally take a single retrieval hop, and resolve the final
//! operations against the pre-turn tree. It owns no state between turns;
//! history and persistence live with the caller.

use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, warn};
use trellis_core::{
    CancelToken, ConversationMessage, GuidanceData, Operation, ProjectNode, SearchRequest,
    TrellisResult,
};
use trellis_llm::{ChatMessage, ChatProvider, ChatResponse};
use trellis_search::SearchProvider;
use trellis_tree::resolve_operations;

use crate::context;

// ============================================================================
// TURN TYPES
// ============================================================================

/// Incremental delivery of a turn to a live consumer.
///
/// `Chunk` events arrive in provider order; exactly one terminal event
/// (`Completed` or `Failed`) follows them, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One content delta from the model.
    Chunk(String),
    /// The turn finished; the full result is available to the caller.
    Completed,
    /// The turn aborted; carries the error text.
    Failed(String),
}

/// The resolved outcome of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    /// Conversational prose from the final pass.
    pub text_response: String,
    /// Tree operations, id-qualified against the pre-turn tree.
    pub operations: Vec<Operation>,
    /// Optional UI guidance from the final pass.
    pub guidance: Option<GuidanceData>,
    /// The retrieval request that was performed this turn, if any.
    pub search_request: Option<SearchRequest>,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Stateless coordinator for conversation turns.
pub struct Orchestrator {
    provider: Arc<dyn ChatProvider>,
    search: Arc<dyn SearchProvider>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn ChatProvider>, search: Arc<dyn SearchProvider>) -> Self {
        Self { provider, search }
    }

    /// Run one turn against the given pre-turn tree and history.
    ///
    /// When `events` is supplied the provider passes stream through it and
    /// a terminal event is emitted exactly once, after all chunks. The
    /// returned result is the same either way.
    pub async fn run_turn(
        &self,
        tree: &[ProjectNode],
        history: &[ConversationMessage],
        user_text: &str,
        events: Option<UnboundedSender<StreamEvent>>,
        cancel: &CancelToken,
    ) -> TrellisResult<TurnResult> {
        let outcome = self
            .drive_turn(tree, history, user_text, events.as_ref(), cancel)
            .await;
        if let Some(events) = &events {
            let terminal = match &outcome {
                Ok(_) => StreamEvent::Completed,
                Err(error) => StreamEvent::Failed(error.to_string()),
            };
            let _ = events.send(terminal);
        }
        outcome
    }

    async fn drive_turn(
        &self,
        tree: &[ProjectNode],
        history: &[ConversationMessage],
        user_text: &str,
        events: Option<&UnboundedSender<StreamEvent>>,
        cancel: &CancelToken,
    ) -> TrellisResult<TurnResult> {
        let system_prompt = context::system_prompt(tree);
        let mut messages = context::build_messages(&system_prompt, history, user_text);

        let reply = self.call_provider(&messages, events, cancel).await?;
        let mut parsed = trellis_parse::extract(&reply.content);
        let mut performed_search = None;

        // At most one retrieval hop per turn.
        if let Some(request) = parsed.search_request.take() {
            debug!(query = %request.query, "model requested retrieval");
            let results = self.search.search(&request.query).await;
            messages.push(context::search_results_message(&results));

            let reply = self.call_provider(&messages, events, cancel).await?;
            parsed = trellis_parse::extract(&reply.content);
            if let Some(ignored) = parsed.search_request.take() {
                warn!(query = %ignored.query, "second retrieval request in one turn ignored");
            }
            performed_search = Some(request);
        }

        let operations = resolve_operations(tree, &parsed.operations);
        debug!(
            operations = operations.len(),
            searched = performed_search.is_some(),
            "turn resolved"
        );

        Ok(TurnResult {
            text_response: parsed.text_response,
            operations,
            guidance: parsed.guidance,
            search_request: performed_search,
        })
    }

    /// One provider pass: streamed through `events` when supplied, else a
    /// blocking send. The chunk forwarder is joined before returning so no
    /// chunk can trail the caller's terminal event.
    async fn call_provider(
        &self,
        messages: &[ChatMessage],
        events: Option<&UnboundedSender<StreamEvent>>,
        cancel: &CancelToken,
    ) -> TrellisResult<ChatResponse> {
        let Some(events) = events else {
            return self.provider.send(messages, cancel).await;
        };

        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<String>();
        let forward_to = events.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                // The consumer may have gone away; streaming is best-effort.
                let _ = forward_to.send(StreamEvent::Chunk(chunk));
            }
        });

        let outcome = self.provider.stream(messages, chunk_tx, cancel).await;
        let _ = forwarder.await;
        outcome
    }
}

// ============================================================================
// TESTS
// ============================================================================
