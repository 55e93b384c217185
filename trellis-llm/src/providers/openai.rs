//! OpenAI chat provider.

use super::compat::{CompatClient, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::{ChatMessage, ChatProvider, ChatResponse};
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use trellis_core::{CancelToken, ConfigError, ProviderConfig, TrellisResult};

const PROVIDER_ID: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// The baseline provider. Requires an API key and a model.
#[derive(Debug)]
pub struct OpenAiProvider {
    client: CompatClient,
}

impl OpenAiProvider {
    /// Build from settings, failing fast when required fields are missing.
    pub fn try_new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "llm.openai.api_key".to_string(),
            });
        }
        if config.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "llm.openai.model".to_string(),
            });
        }

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            client: CompatClient::new(
                PROVIDER_ID,
                base_url,
                Some(config.api_key.clone()),
                config.model.clone(),
                config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            ),
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        cancel: &CancelToken,
    ) -> TrellisResult<ChatResponse> {
        self.client.send_chat(messages, cancel).await
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        chunk_tx: UnboundedSender<String>,
        cancel: &CancelToken,
    ) -> TrellisResult<ChatResponse> {
        self.client.stream_chat(messages, chunk_tx, cancel).await
    }

    async fn test_connection(&self) -> bool {
        self.client.probe().await
    }
}
