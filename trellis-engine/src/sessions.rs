//! Caller-facing session surface.
//!
//! The registry keys one conversation engine per project path and wires a
//! completed turn into persistence: checkpoint the pre-turn document when
//! the turn mutates the tree, apply the resolved operations, save, and
//! append both messages to the side chat log. Cancellation tokens are
//! scoped per in-flight turn and keyed by the same path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};
use trellis_core::{
    CancelToken, ConversationMessage, GuidanceData, Operation, ProjectData, TrellisResult,
};
use trellis_llm::ChatProvider;
use trellis_search::SearchProvider;
use trellis_store::{ChatLog, ProjectStore};
use trellis_tree::apply_all;

use crate::engine::ConversationEngine;
use crate::orchestrator::StreamEvent;

/// Longest user-message prefix used as a checkpoint description.
const DESCRIPTION_MAX: usize = 60;

/// What one completed turn hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub text_response: String,
    /// Id-qualified operations that were applied this turn (may be empty).
    pub operations: Vec<Operation>,
    pub guidance: Option<GuidanceData>,
    /// The document as persisted after the turn.
    pub project: ProjectData,
}

/// Per-project conversation sessions plus the store pass-throughs.
pub struct SessionRegistry {
    store: ProjectStore,
    chat_log: ChatLog,
    provider: Arc<dyn ChatProvider>,
    search: Arc<dyn SearchProvider>,
    engines: StdMutex<HashMap<PathBuf, Arc<AsyncMutex<ConversationEngine>>>>,
    active: StdMutex<HashMap<PathBuf, CancelToken>>,
}

impl SessionRegistry {
    pub fn new(provider: Arc<dyn ChatProvider>, search: Arc<dyn SearchProvider>) -> Self {
        Self {
            store: ProjectStore::new(),
            chat_log: ChatLog::new(),
            provider,
            search,
            engines: StdMutex::new(HashMap::new()),
            active: StdMutex::new(HashMap::new()),
        }
    }

    /// Run one turn for the project at `path` and persist its outcome.
    ///
    /// The turn runs against the on-disk document. When it yields
    /// operations, the pre-turn document is checkpointed before the mutated
    /// one is saved, so undo always returns to the state the turn started
    /// from. A failed or cancelled turn persists nothing.
    pub async fn send_message(
        &self,
        path: &Path,
        text: &str,
        events: Option<UnboundedSender<StreamEvent>>,
    ) -> TrellisResult<TurnOutcome> {
        let key = ProjectStore::project_file(path);
        let project = self.store.load(&key)?;
        let engine = self.engine_for(&key, &project);

        // Token registration happens under the engine lock so a turn queued
        // behind this one cannot clobber the running turn's token.
        let mut session = engine.lock().await;
        let cancel = CancelToken::new();
        lock(&self.active).insert(key.clone(), cancel.clone());
        let turn = session
            .send_user_message(text, &project, events, &cancel)
            .await;
        lock(&self.active).remove(&key);
        let turn = turn?;

        let user_message = ConversationMessage::user(text);
        let mut assistant = ConversationMessage::assistant(turn.text_response.as_str());
        if let Some(guidance) = &turn.guidance {
            assistant = assistant.with_guidance(guidance.clone());
        }

        let mut next = project;
        next.chat_history.push(user_message.clone());
        next.chat_history.push(assistant.clone());
        if !turn.operations.is_empty() {
            self.store.create_snapshot(&key, &turn_description(text))?;
            next.structure_tree = apply_all(&next.structure_tree, &turn.operations);
        }
        let saved = self.store.save(&key, &next)?;
        self.chat_log.append(&key, &user_message);
        self.chat_log.append(&key, &assistant);

        info!(
            project = %key.display(),
            operations = turn.operations.len(),
            searched = turn.search_request.is_some(),
            "turn persisted"
        );

        Ok(TurnOutcome {
            text_response: turn.text_response,
            operations: turn.operations,
            guidance: turn.guidance,
            project: saved,
        })
    }

    /// Trigger cancellation of the in-flight turn for `path`, if any.
    pub fn cancel(&self, path: &Path) {
        let key = ProjectStore::project_file(path);
        if let Some(token) = lock(&self.active).get(&key) {
            info!(project = %key.display(), "cancelling in-flight turn");
            token.cancel();
        }
    }

    /// In-memory history for the project's session; empty when no session
    /// has been started.
    pub async fn get_history(&self, path: &Path) -> Vec<ConversationMessage> {
        let key = ProjectStore::project_file(path);
        let engine = lock(&self.engines).get(&key).cloned();
        match engine {
            Some(engine) => engine.lock().await.history().to_vec(),
            None => Vec::new(),
        }
    }

    /// Clear the in-memory history for the project's session; silent when
    /// no session exists.
    pub async fn clear_history(&self, path: &Path) {
        let key = ProjectStore::project_file(path);
        let engine = lock(&self.engines).get(&key).cloned();
        if let Some(engine) = engine {
            engine.lock().await.clear_history();
        }
    }

    // ------------------------------------------------------------------
    // Store pass-throughs
    // ------------------------------------------------------------------

    pub fn create_project(&self, path: &Path, name: &str) -> TrellisResult<ProjectData> {
        self.store.create(path, name)
    }

    pub fn load_project(&self, path: &Path) -> TrellisResult<ProjectData> {
        self.store.load(path)
    }

    pub fn save_project(&self, path: &Path, data: &ProjectData) -> TrellisResult<ProjectData> {
        self.store.save(path, data)
    }

    /// Restore the most recent checkpoint; `None` when there is none.
    pub fn undo(&self, path: &Path) -> TrellisResult<Option<ProjectData>> {
        self.store.rollback(path)
    }

    /// Existing session for `key`, or a new one seeded from the document's
    /// persisted history.
    fn engine_for(&self, key: &Path, project: &ProjectData) -> Arc<AsyncMutex<ConversationEngine>> {
        let mut engines = lock(&self.engines);
        engines
            .entry(key.to_path_buf())
            .or_insert_with(|| {
                debug!(project = %key.display(), "starting conversation session");
                Arc::new(AsyncMutex::new(ConversationEngine::seeded(
                    self.provider.clone(),
                    self.search.clone(),
                    project.chat_history.clone(),
                )))
            })
            .clone()
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Checkpoint description derived from the triggering user message.
fn turn_description(text: &str) -> String {
    let trimmed = text.trim();
    let mut description: String = trimmed.chars().take(DESCRIPTION_MAX).collect();
    if trimmed.chars().count() > DESCRIPTION_MAX {
        description.push_str("...");
    }
    format!("Before: {}", description)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use trellis_core::{NodeType, Role, TrellisError};
    use trellis_test_utils::{
        reply_with_operations, reply_with_search, HangingChatProvider, ScriptedChatProvider,
        ScriptedSearchProvider,
    };

    fn registry(provider: Arc<ScriptedChatProvider>) -> SessionRegistry {
        SessionRegistry::new(provider, Arc::new(ScriptedSearchProvider::canned()))
    }

    fn setup_project(registry: &SessionRegistry, name: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();
        registry.create_project(&path, name).unwrap();
        (dir, path)
    }

    fn add_security_with_cameras() -> String {
        reply_with_operations(
            "Setting up the security subsystem.",
            json!([
                {
                    "type": "add",
                    "nodeData": { "type": "subsystem", "name": "Security" }
                },
                {
                    "type": "add",
                    "targetParentName": "Security",
                    "nodeData": { "type": "device", "name": "Camera", "quantity": 10 }
                }
            ]),
        )
    }

    #[tokio::test]
    async fn test_turn_builds_tree_from_empty_project() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_reply(add_security_with_cameras());
        let registry = registry(provider);
        let (_dir, path) = setup_project(&registry, "Acme HQ Security");

        let outcome = registry.send_message(&path, "Add security", None).await.unwrap();

        let tree = &outcome.project.structure_tree;
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].node_type, NodeType::Subsystem);
        assert_eq!(tree[0].name, "Security");
        assert_eq!(tree[0].children.len(), 1);
        let camera = &tree[0].children[0];
        assert_eq!(camera.node_type, NodeType::Device);
        assert_eq!(camera.name, "Camera");
        assert_eq!(camera.quantity, 10);

        // The same state is on disk.
        let loaded = registry.load_project(&path).unwrap();
        assert_eq!(loaded.structure_tree, outcome.project.structure_tree);
        assert_eq!(loaded.chat_history.len(), 2);
    }

    #[tokio::test]
    async fn test_update_keeps_node_identity() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_reply(add_security_with_cameras());
        provider.push_reply(reply_with_operations(
            "Doubling the camera count.",
            json!([{
                "type": "update",
                "targetNodeName": "Camera",
                "nodeData": { "quantity": 20 }
            }]),
        ));
        let registry = registry(provider);
        let (_dir, path) = setup_project(&registry, "Acme HQ Security");

        let first = registry.send_message(&path, "Add security", None).await.unwrap();
        let camera_id = first.project.structure_tree[0].children[0].id;

        let second = registry
            .send_message(&path, "Make it 20 cameras", None)
            .await
            .unwrap();
        let camera = &second.project.structure_tree[0].children[0];
        assert_eq!(camera.id, camera_id);
        assert_eq!(camera.quantity, 20);
        assert_eq!(camera.name, "Camera");
    }

    #[tokio::test]
    async fn test_delete_removes_whole_subtree() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_reply(add_security_with_cameras());
        provider.push_reply(reply_with_operations(
            "Removing the security subsystem.",
            json!([{ "type": "delete", "targetNodeName": "Security" }]),
        ));
        let registry = registry(provider);
        let (_dir, path) = setup_project(&registry, "Acme HQ Security");

        registry.send_message(&path, "Add security", None).await.unwrap();
        let outcome = registry
            .send_message(&path, "Drop security entirely", None)
            .await
            .unwrap();

        assert!(outcome.project.structure_tree.is_empty());
        assert!(registry.load_project(&path).unwrap().structure_tree.is_empty());
    }

    #[tokio::test]
    async fn test_undo_without_checkpoints_returns_none() {
        let registry = registry(Arc::new(ScriptedChatProvider::new()));
        let (_dir, path) = setup_project(&registry, "Untouched");
        let before = registry.load_project(&path).unwrap();

        let restored = registry.undo(&path).unwrap();
        assert!(restored.is_none());
        assert_eq!(registry.load_project(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_ops_turn_checkpoints_pre_turn_state() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_reply(add_security_with_cameras());
        let registry = registry(provider);
        let (_dir, path) = setup_project(&registry, "Acme HQ Security");
        let key = ProjectStore::project_file(&path);

        registry.send_message(&path, "Add security", None).await.unwrap();

        let store = ProjectStore::new();
        assert_eq!(store.checkpoints().count(&key).unwrap(), 1);
        let checkpoint = store.checkpoints().latest(&key).unwrap().unwrap();
        assert!(checkpoint.project.structure_tree.is_empty());
        assert!(checkpoint.description.contains("Add security"));

        // Undo returns to the pre-turn document.
        let restored = registry.undo(&path).unwrap().unwrap();
        assert!(restored.structure_tree.is_empty());
        assert!(registry.load_project(&path).unwrap().structure_tree.is_empty());
    }

    #[tokio::test]
    async fn test_chat_only_turn_saves_history_without_checkpoint() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_reply("Your project looks well balanced.");
        let registry = registry(provider);
        let (_dir, path) = setup_project(&registry, "Acme HQ Security");
        let key = ProjectStore::project_file(&path);

        let outcome = registry
            .send_message(&path, "Any feedback?", None)
            .await
            .unwrap();
        assert!(outcome.operations.is_empty());

        let loaded = registry.load_project(&path).unwrap();
        assert_eq!(loaded.chat_history.len(), 2);
        assert_eq!(loaded.chat_history[0].role, Role::User);
        assert_eq!(loaded.chat_history[1].role, Role::Assistant);
        assert_eq!(ProjectStore::new().checkpoints().count(&key).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_persists_nothing() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_failure("backend down");
        let registry = registry(provider);
        let (_dir, path) = setup_project(&registry, "Acme HQ Security");
        let before = registry.load_project(&path).unwrap();
        let key = ProjectStore::project_file(&path);

        let outcome = registry.send_message(&path, "Add security", None).await;
        assert!(outcome.is_err());

        assert_eq!(registry.load_project(&path).unwrap(), before);
        assert_eq!(ProjectStore::new().checkpoints().count(&key).unwrap(), 0);
        assert!(ChatLog::new().read(&key).is_empty());
        assert!(registry.get_history(&path).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_turn_persists_nothing() {
        let registry = Arc::new(SessionRegistry::new(
            Arc::new(HangingChatProvider),
            Arc::new(ScriptedSearchProvider::canned()),
        ));
        let (_dir, path) = setup_project(&registry, "Acme HQ Security");
        let before = registry.load_project(&path).unwrap();

        let mut task = {
            let registry = registry.clone();
            let path = path.clone();
            tokio::spawn(async move { registry.send_message(&path, "hello", None).await })
        };

        // Cancel repeatedly until the turn observes the token; the first
        // call can race session start-up.
        let mut outcome = None;
        for _ in 0..200 {
            registry.cancel(&path);
            match tokio::time::timeout(Duration::from_millis(10), &mut task).await {
                Ok(joined) => {
                    outcome = Some(joined.unwrap());
                    break;
                }
                Err(_) => continue,
            }
        }

        assert!(matches!(outcome, Some(Err(TrellisError::Cancelled))));
        assert_eq!(registry.load_project(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_search_hop_turn_persists_operations() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_reply(reply_with_search("Checking specs.", "ip camera specs"));
        provider.push_reply(reply_with_operations(
            "Adding the recommended camera.",
            json!([{
                "type": "add",
                "nodeData": { "type": "subsystem", "name": "Security" }
            }]),
        ));
        let search = Arc::new(ScriptedSearchProvider::canned());
        let registry = SessionRegistry::new(provider.clone(), search.clone());
        let (_dir, path) = setup_project(&registry, "Acme HQ Security");

        let outcome = registry
            .send_message(&path, "Which camera should we use?", None)
            .await
            .unwrap();

        assert_eq!(search.call_count(), 1);
        assert_eq!(provider.request_count(), 2);
        assert_eq!(outcome.project.structure_tree.len(), 1);
    }

    #[tokio::test]
    async fn test_history_surface_roundtrip() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_reply("Hello there.");
        let registry = registry(provider);
        let (_dir, path) = setup_project(&registry, "Acme HQ Security");

        assert!(registry.get_history(&path).await.is_empty());

        registry.send_message(&path, "Hi", None).await.unwrap();
        let history = registry.get_history(&path).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Hi");
        assert_eq!(history[1].content, "Hello there.");

        registry.clear_history(&path).await;
        assert!(registry.get_history(&path).await.is_empty());
    }

    #[tokio::test]
    async fn test_session_seeded_from_persisted_history() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_reply("Welcome back.");
        let registry = registry(provider.clone());
        let (_dir, path) = setup_project(&registry, "Acme HQ Security");

        let mut data = registry.load_project(&path).unwrap();
        data.chat_history = vec![
            ConversationMessage::user("first"),
            ConversationMessage::assistant("second"),
            ConversationMessage::user("third"),
        ];
        registry.save_project(&path, &data).unwrap();

        registry.send_message(&path, "I am back", None).await.unwrap();

        let history = registry.get_history(&path).await;
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[4].content, "Welcome back.");

        // The seeded messages are part of the prompt window.
        let request = &provider.requests()[0];
        assert_eq!(request.len(), 5);
        assert_eq!(request[1].content, "first");
        assert_eq!(request[4].content, "I am back");
    }

    #[tokio::test]
    async fn test_chat_log_mirrors_turn_messages() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_reply("Logged reply.");
        let registry = registry(provider);
        let (_dir, path) = setup_project(&registry, "Acme HQ Security");
        let key = ProjectStore::project_file(&path);

        registry.send_message(&path, "Log me", None).await.unwrap();

        let entries = ChatLog::new().read(&key);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[0].content, "Log me");
        assert_eq!(entries[1].role, Role::Assistant);
        assert_eq!(entries[1].content, "Logged reply.");
    }

    #[tokio::test]
    async fn test_directory_and_file_paths_share_a_session() {
        let provider = Arc::new(ScriptedChatProvider::new());
        provider.push_reply("Same session.");
        let registry = registry(provider);
        let (_dir, path) = setup_project(&registry, "Acme HQ Security");

        registry.send_message(&path, "Hi", None).await.unwrap();

        let file_path = path.join("project.json");
        assert_eq!(registry.get_history(&file_path).await.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_without_active_turn_is_silent() {
        let registry = registry(Arc::new(ScriptedChatProvider::new()));
        let (_dir, path) = setup_project(&registry, "Acme HQ Security");
        registry.cancel(&path);
    }

    #[test]
    fn test_turn_description_truncates_long_messages() {
        let short = turn_description("Add cameras");
        assert_eq!(short, "Before: Add cameras");

        let long = turn_description(&"x".repeat(100));
        assert!(long.starts_with("Before: "));
        assert!(long.ends_with("..."));
        assert!(long.len() < 100);
    }
}
