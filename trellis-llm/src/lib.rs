//! TRELLIS LLM - Chat Providers
//!
//! One trait in front of four OpenAI-compatible vendors (OpenAI, DeepSeek,
//! Ollama, and custom self-hosted endpoints), plus a mock for offline use.
//! Providers stream over SSE, honor cooperative cancellation, and surface
//! token usage when the vendor reports it.

pub mod providers;

pub use providers::{CustomProvider, DeepSeekProvider, OllamaProvider, OpenAiProvider};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;
use trellis_core::{
    CancelToken, ConversationMessage, LlmSettings, Role, TrellisError, TrellisResult,
};

// ============================================================================
// PROMPT & RESPONSE TYPES
// ============================================================================

/// One prompt message handed to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&ConversationMessage> for ChatMessage {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Token accounting for one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    /// Some vendors omit this and report only the total.
    pub completion_tokens: Option<i64>,
    pub total_tokens: i64,
}

/// A completed (or fully streamed) provider reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    /// `None` on the streaming path and for vendors that never report usage.
    pub usage: Option<TokenUsage>,
}

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// A chat completion backend.
///
/// Implementations are assembled once from settings and shared behind an
/// `Arc`. Every call takes a cancellation token so an in-flight turn can be
/// abandoned without tearing the provider down.
#[async_trait]
pub trait ChatProvider: Send + Sync + std::fmt::Debug {
    /// Stable vendor id (`openai`, `deepseek`, ...).
    fn provider_id(&self) -> &str;

    /// Send a prompt and wait for the full reply.
    async fn send(
        &self,
        messages: &[ChatMessage],
        cancel: &CancelToken,
    ) -> TrellisResult<ChatResponse>;

    /// Stream a reply, pushing each content delta through `chunk_tx` and
    /// returning the accumulated text once the stream closes.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        chunk_tx: UnboundedSender<String>,
        cancel: &CancelToken,
    ) -> TrellisResult<ChatResponse>;

    /// Whether the backend is reachable with the current settings.
    async fn test_connection(&self) -> bool;
}

// ============================================================================
// FACTORY
// ============================================================================

/// Build the provider the settings select.
///
/// Unrecognized provider ids fall back to the baseline vendor with a warning
/// rather than failing startup; an incomplete config block for the selected
/// vendor is still an error.
pub fn create_provider(settings: &LlmSettings) -> TrellisResult<Arc<dyn ChatProvider>> {
    let provider_id = settings.active_provider();
    let config = settings.config_for(provider_id);
    let provider: Arc<dyn ChatProvider> = match provider_id {
        "deepseek" => Arc::new(DeepSeekProvider::try_new(config)?),
        "ollama" => Arc::new(OllamaProvider::try_new(config)?),
        "custom" => Arc::new(CustomProvider::try_new(config)?),
        _ => Arc::new(OpenAiProvider::try_new(config)?),
    };
    info!(provider = provider.provider_id(), model = %config.model, "LLM provider ready");
    Ok(provider)
}

// ============================================================================
// MOCK PROVIDER
// ============================================================================

/// Canned provider for tests and offline development.
///
/// Answers every prompt with the configured reply; streaming splits the
/// reply into word-sized chunks. Cancellation is honored like the real ones.
#[derive(Debug, Clone)]
pub struct MockChatProvider {
    reply: String,
}

impl MockChatProvider {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

impl Default for MockChatProvider {
    fn default() -> Self {
        Self::new("Mock reply.")
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    fn provider_id(&self) -> &str {
        "mock"
    }

    async fn send(
        &self,
        _messages: &[ChatMessage],
        cancel: &CancelToken,
    ) -> TrellisResult<ChatResponse> {
        if cancel.is_cancelled() {
            return Err(TrellisError::Cancelled);
        }
        Ok(ChatResponse {
            content: self.reply.clone(),
            usage: None,
        })
    }

    async fn stream(
        &self,
        _messages: &[ChatMessage],
        chunk_tx: UnboundedSender<String>,
        cancel: &CancelToken,
    ) -> TrellisResult<ChatResponse> {
        for chunk in self.reply.split_inclusive(' ') {
            if cancel.is_cancelled() {
                return Err(TrellisError::Cancelled);
            }
            let _ = chunk_tx.send(chunk.to_string());
        }
        Ok(ChatResponse {
            content: self.reply.clone(),
            usage: None,
        })
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use trellis_core::ProviderConfig;

    fn keyed(model: &str) -> ProviderConfig {
        ProviderConfig {
            api_key: "sk-test".to_string(),
            model: model.to_string(),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_chat_message_constructors() {
        assert_eq!(ChatMessage::system("s").role, Role::System);
        assert_eq!(ChatMessage::user("u").role, Role::User);
        assert_eq!(ChatMessage::assistant("a").role, Role::Assistant);
        assert_eq!(ChatMessage::user("hello").content, "hello");
    }

    #[test]
    fn test_chat_message_from_history_entry() {
        let entry = ConversationMessage::new(Role::Assistant, "done");
        let message = ChatMessage::from(&entry);
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content, "done");
    }

    #[test]
    fn test_create_provider_dispatches_on_id() {
        let mut settings = LlmSettings::default();
        settings.openai = keyed("gpt-4o-mini");
        settings.deepseek = keyed("deepseek-chat");
        settings.custom = ProviderConfig {
            base_url: Some("http://gateway:8000/v1".to_string()),
            ..keyed("qwen2.5")
        };

        for (id, expected) in [
            ("openai", "openai"),
            ("deepseek", "deepseek"),
            ("ollama", "ollama"),
            ("custom", "custom"),
        ] {
            settings.provider = id.to_string();
            let provider = create_provider(&settings).unwrap();
            assert_eq!(provider.provider_id(), expected);
        }
    }

    #[test]
    fn test_create_provider_falls_back_on_unknown_id() {
        let mut settings = LlmSettings::default();
        settings.provider = "gemini".to_string();
        settings.openai = keyed("gpt-4o-mini");
        let provider = create_provider(&settings).unwrap();
        assert_eq!(provider.provider_id(), "openai");
    }

    #[test]
    fn test_create_provider_surfaces_config_errors() {
        let settings = LlmSettings::default();
        // Default OpenAI block has no API key.
        let err = create_provider(&settings).unwrap_err();
        assert!(matches!(err, TrellisError::Config(_)));
    }

    #[tokio::test]
    async fn test_mock_send_returns_reply() {
        let provider = MockChatProvider::new("All set.");
        let cancel = CancelToken::new();
        let response = provider
            .send(&[ChatMessage::user("hi")], &cancel)
            .await
            .unwrap();
        assert_eq!(response.content, "All set.");
        assert!(response.usage.is_none());
    }

    #[tokio::test]
    async fn test_mock_stream_chunks_reassemble() {
        let provider = MockChatProvider::new("one two three");
        let cancel = CancelToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let response = provider
            .stream(&[ChatMessage::user("hi")], tx, &cancel)
            .await
            .unwrap();

        let mut streamed = String::new();
        while let Ok(chunk) = rx.try_recv() {
            streamed.push_str(&chunk);
        }
        assert_eq!(streamed, "one two three");
        assert_eq!(response.content, streamed);
    }

    #[tokio::test]
    async fn test_mock_honors_cancellation() {
        let provider = MockChatProvider::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = provider
            .send(&[ChatMessage::user("hi")], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TrellisError::Cancelled));

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = provider
            .stream(&[ChatMessage::user("hi")], tx, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TrellisError::Cancelled));
    }

    #[tokio::test]
    async fn test_mock_connection_always_healthy() {
        assert!(MockChatProvider::default().test_connection().await);
    }
}
