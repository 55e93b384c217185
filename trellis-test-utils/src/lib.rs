//! TRELLIS Test Utilities
//!
//! Shared test infrastructure for the Trellis workspace:
//! - Scripted chat and search providers with call recording
//! - A hanging provider for exercising cancellation paths
//! - Fixture builders for trees, documents, and model replies

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use trellis_core::{
    CancelToken, NodeType, ProjectData, ProjectNode, ProviderError, SearchResult, TrellisError,
    TrellisResult,
};
use trellis_llm::{ChatMessage, ChatProvider, ChatResponse};
use trellis_search::SearchProvider;

// ============================================================================
// SCRIPTED CHAT PROVIDER
// ============================================================================

/// One scripted turn of a chat provider.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Streamed as the given chunks; the content is their concatenation.
    Content(Vec<String>),
    /// The call fails with a provider error carrying this message.
    Failure(String),
}

/// Chat provider that answers from a script and records every request.
///
/// Replies are consumed front to back, one per call (`send` or `stream`
/// alike). An exhausted script answers with `EmptyResponse` so a test that
/// under-scripts fails loudly instead of hanging.
#[derive(Debug, Default)]
pub struct ScriptedChatProvider {
    script: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChatProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply delivered as a single chunk.
    pub fn push_reply(&self, text: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Content(vec![text.into()]));
    }

    /// Queue a reply with explicit chunk boundaries.
    pub fn push_chunks(&self, chunks: Vec<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Content(chunks));
    }

    /// Queue a failing call.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Failure(message.into()));
    }

    /// Every prompt this provider has been called with, in order.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Replies still queued; zero means the script was fully consumed.
    pub fn remaining_replies(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    fn next_reply(&self, messages: &[ChatMessage]) -> TrellisResult<ScriptedReply> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.script.lock().unwrap().pop_front().ok_or_else(|| {
            TrellisError::Provider(ProviderError::EmptyResponse {
                provider: "scripted".to_string(),
            })
        })
    }
}

#[async_trait]
impl ChatProvider for ScriptedChatProvider {
    fn provider_id(&self) -> &str {
        "scripted"
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        cancel: &CancelToken,
    ) -> TrellisResult<ChatResponse> {
        if cancel.is_cancelled() {
            return Err(TrellisError::Cancelled);
        }
        match self.next_reply(messages)? {
            ScriptedReply::Content(chunks) => Ok(ChatResponse {
                content: chunks.concat(),
                usage: None,
            }),
            ScriptedReply::Failure(message) => Err(TrellisError::Provider(
                ProviderError::RequestFailed {
                    provider: "scripted".to_string(),
                    status: 500,
                    message,
                },
            )),
        }
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        chunk_tx: UnboundedSender<String>,
        cancel: &CancelToken,
    ) -> TrellisResult<ChatResponse> {
        if cancel.is_cancelled() {
            return Err(TrellisError::Cancelled);
        }
        match self.next_reply(messages)? {
            ScriptedReply::Content(chunks) => {
                let mut content = String::new();
                for chunk in chunks {
                    if cancel.is_cancelled() {
                        return Err(TrellisError::Cancelled);
                    }
                    content.push_str(&chunk);
                    let _ = chunk_tx.send(chunk);
                }
                Ok(ChatResponse {
                    content,
                    usage: None,
                })
            }
            ScriptedReply::Failure(message) => Err(TrellisError::Provider(
                ProviderError::RequestFailed {
                    provider: "scripted".to_string(),
                    status: 500,
                    message,
                },
            )),
        }
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

// ============================================================================
// HANGING CHAT PROVIDER
// ============================================================================

/// Provider that never answers; it resolves only when the token fires.
/// For exercising cancellation paths deterministically.
#[derive(Debug, Clone, Copy, Default)]
pub struct HangingChatProvider;

#[async_trait]
impl ChatProvider for HangingChatProvider {
    fn provider_id(&self) -> &str {
        "hanging"
    }

    async fn send(
        &self,
        _messages: &[ChatMessage],
        cancel: &CancelToken,
    ) -> TrellisResult<ChatResponse> {
        cancel.cancelled().await;
        Err(TrellisError::Cancelled)
    }

    async fn stream(
        &self,
        _messages: &[ChatMessage],
        _chunk_tx: UnboundedSender<String>,
        cancel: &CancelToken,
    ) -> TrellisResult<ChatResponse> {
        cancel.cancelled().await;
        Err(TrellisError::Cancelled)
    }

    async fn test_connection(&self) -> bool {
        false
    }
}

// ============================================================================
// SCRIPTED SEARCH PROVIDER
// ============================================================================

/// Search provider with canned results, a call counter, and query recording.
#[derive(Debug, Default)]
pub struct ScriptedSearchProvider {
    results: Vec<SearchResult>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSearchProvider {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// One generic result, enough for most orchestration tests.
    pub fn canned() -> Self {
        Self::new(vec![SearchResult {
            title: "Vendor datasheet".to_string(),
            content: "4K PoE cameras draw up to 12.95W per port.".to_string(),
            url: "https://example.com/datasheet".to_string(),
        }])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearchProvider {
    fn provider_id(&self) -> &str {
        "scripted"
    }

    async fn search(&self, query: &str) -> Vec<SearchResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        self.results.clone()
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A small, realistic tree: Security > IP Camera (x10, 4K) > Night Vision.
pub fn security_tree() -> Vec<ProjectNode> {
    vec![ProjectNode::new(NodeType::Subsystem, "Security").with_child(
        ProjectNode::new(NodeType::Device, "IP Camera")
            .with_quantity(10)
            .with_spec("resolution", "4K")
            .with_child(ProjectNode::new(NodeType::Feature, "Night Vision")),
    )]
}

/// A project document carrying the [`security_tree`] fixture.
pub fn sample_project(name: &str) -> ProjectData {
    let mut data = ProjectData::new(name);
    data.structure_tree = security_tree();
    data
}

/// A model reply: prose plus a fenced operations payload.
pub fn reply_with_operations(prose: &str, operations: Value) -> String {
    format!(
        "{}\n```json\n{}\n```",
        prose,
        json!({ "operations": operations })
    )
}

/// A model reply asking for one web search.
pub fn reply_with_search(prose: &str, query: &str) -> String {
    format!(
        "{}\n```json\n{}\n```",
        prose,
        json!({ "tool": "search", "query": query })
    )
}

// ============================================================================
// TESTS
// ============================================================================
