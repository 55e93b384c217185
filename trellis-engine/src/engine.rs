//! Per-project conversation state.
//!
//! One engine per open project: it holds the bounded in-memory history the
//! prompt window draws from and runs each turn through the orchestrator.
//! The complete history lives in the persisted document; the engine only
//! keeps enough recent context to carry the conversation.

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use trellis_core::{CancelToken, ConversationMessage, ProjectData, TrellisResult};
use trellis_llm::ChatProvider;
use trellis_search::SearchProvider;

use crate::orchestrator::{Orchestrator, StreamEvent, TurnResult};

/// Upper bound on messages kept in working memory.
pub const HISTORY_CAP: usize = 20;

/// Conversation state for a single project.
pub struct ConversationEngine {
    orchestrator: Orchestrator,
    history: Vec<ConversationMessage>,
}

impl ConversationEngine {
    pub fn new(provider: Arc<dyn ChatProvider>, search: Arc<dyn SearchProvider>) -> Self {
        Self::seeded(provider, search, Vec::new())
    }

    /// Resume from persisted history, keeping the most recent messages up
    /// to the cap.
    pub fn seeded(
        provider: Arc<dyn ChatProvider>,
        search: Arc<dyn SearchProvider>,
        mut history: Vec<ConversationMessage>,
    ) -> Self {
        if history.len() > HISTORY_CAP {
            history.drain(..history.len() - HISTORY_CAP);
        }
        Self {
            orchestrator: Orchestrator::new(provider, search),
            history,
        }
    }

    /// Run one turn against the given document. On success the user message
    /// and the assistant reply are recorded in memory; a failed or
    /// cancelled turn records nothing, so a retry sees the same context.
    pub async fn send_user_message(
        &mut self,
        text: &str,
        project: &ProjectData,
        events: Option<UnboundedSender<StreamEvent>>,
        cancel: &CancelToken,
    ) -> TrellisResult<TurnResult> {
        let result = self
            .orchestrator
            .run_turn(&project.structure_tree, &self.history, text, events, cancel)
            .await?;

        self.history.push(ConversationMessage::user(text));
        let mut assistant = ConversationMessage::assistant(result.text_response.as_str());
        if let Some(guidance) = &result.guidance {
            assistant = assistant.with_guidance(guidance.clone());
        }
        self.history.push(assistant);
        if self.history.len() > HISTORY_CAP {
            let excess = self.history.len() - HISTORY_CAP;
            self.history.drain(..excess);
        }

        Ok(result)
    }

    /// In-memory history, oldest first.
    pub fn history(&self) -> &[ConversationMessage] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::{GuidanceIntent, Role};
    use trellis_test_utils::{sample_project, ScriptedChatProvider, ScriptedSearchProvider};

    fn engine_with(provider: ScriptedChatProvider) -> ConversationEngine {
        ConversationEngine::new(
            Arc::new(provider),
            Arc::new(ScriptedSearchProvider::canned()),
        )
    }

    fn seeded_messages(count: usize) -> Vec<ConversationMessage> {
        (0..count)
            .map(|i| ConversationMessage::user(format!("m{}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_successful_turn_records_both_messages() {
        let provider = ScriptedChatProvider::new();
        provider.push_reply("Happy to help.");
        let mut engine = engine_with(provider);
        let project = sample_project("Acme HQ");

        engine
            .send_user_message("Hello", &project, None, &CancelToken::new())
            .await
            .unwrap();

        let history = engine.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "Hello");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Happy to help.");
    }

    #[tokio::test]
    async fn test_failed_turn_records_nothing() {
        let provider = ScriptedChatProvider::new();
        provider.push_failure("backend down");
        let mut engine = engine_with(provider);
        let project = sample_project("Acme HQ");

        let outcome = engine
            .send_user_message("Hello", &project, None, &CancelToken::new())
            .await;

        assert!(outcome.is_err());
        assert!(engine.history().is_empty());
    }

    #[tokio::test]
    async fn test_guidance_lands_on_assistant_message() {
        let provider = ScriptedChatProvider::new();
        provider.push_reply(format!(
            "Which resolution?\n```json\n{}\n```",
            json!({
                "guidance": {
                    "intent": "clarification",
                    "text": "Which resolution?",
                    "options": [{ "label": "4K", "value": "Use 4K cameras" }]
                }
            })
        ));
        let mut engine = engine_with(provider);
        let project = sample_project("Acme HQ");

        engine
            .send_user_message("Add cameras", &project, None, &CancelToken::new())
            .await
            .unwrap();

        let guidance = engine.history()[1].guidance.as_ref().unwrap();
        assert_eq!(guidance.intent, GuidanceIntent::Clarification);
        assert_eq!(guidance.options.len(), 1);
        assert_eq!(guidance.options[0].label, "4K");
    }

    #[tokio::test]
    async fn test_seeded_history_trimmed_to_cap() {
        let engine = ConversationEngine::seeded(
            Arc::new(ScriptedChatProvider::new()),
            Arc::new(ScriptedSearchProvider::canned()),
            seeded_messages(25),
        );
        assert_eq!(engine.history().len(), HISTORY_CAP);
        assert_eq!(engine.history()[0].content, "m5");
        assert_eq!(engine.history()[19].content, "m24");
    }

    #[tokio::test]
    async fn test_turn_overflow_drops_oldest() {
        let provider = ScriptedChatProvider::new();
        provider.push_reply("Done.");
        let mut engine = ConversationEngine::seeded(
            Arc::new(provider),
            Arc::new(ScriptedSearchProvider::canned()),
            seeded_messages(19),
        );
        let project = sample_project("Acme HQ");

        engine
            .send_user_message("one more", &project, None, &CancelToken::new())
            .await
            .unwrap();

        let history = engine.history();
        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(history[0].content, "m1");
        assert_eq!(history[19].content, "Done.");
    }

    #[tokio::test]
    async fn test_prompt_window_is_last_five() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_reply("Noted.");
        let mut engine = ConversationEngine::seeded(
            provider.clone(),
            Arc::new(ScriptedSearchProvider::canned()),
            seeded_messages(8),
        );
        let project = sample_project("Acme HQ");

        engine
            .send_user_message("latest", &project, None, &CancelToken::new())
            .await
            .unwrap();

        let request = &provider.requests()[0];
        // System prompt, five history messages, the new user message.
        assert_eq!(request.len(), 7);
        assert_eq!(request[1].content, "m3");
        assert_eq!(request[5].content, "m7");
        assert_eq!(request[6].content, "latest");
    }

    #[tokio::test]
    async fn test_clear_history_empties_memory() {
        let provider = ScriptedChatProvider::new();
        provider.push_reply("Hi.");
        let mut engine = engine_with(provider);
        let project = sample_project("Acme HQ");

        engine
            .send_user_message("Hello", &project, None, &CancelToken::new())
            .await
            .unwrap();
        assert!(!engine.history().is_empty());

        engine.clear_history();
        assert!(engine.history().is_empty());
    }
}
