//! Custom OpenAI-compatible endpoint provider.
//!
//! For self-hosted gateways (vLLM, LiteLLM, llama.cpp server) that speak the
//! OpenAI chat dialect at an arbitrary base URL. The URL and model are
//! required; the API key is optional because many local gateways skip auth.

use super::compat::{CompatClient, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::{ChatMessage, ChatProvider, ChatResponse};
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use trellis_core::{CancelToken, ConfigError, ProviderConfig, TrellisResult};

const PROVIDER_ID: &str = "custom";

pub struct CustomProvider {
    client: CompatClient,
}

impl CustomProvider {
    pub fn try_new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let base_url = match config.base_url.as_deref() {
            Some(url) if !url.trim().is_empty() => url.to_string(),
            _ => {
                return Err(ConfigError::MissingRequired {
                    field: "llm.custom.base_url".to_string(),
                })
            }
        };
        if config.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "llm.custom.model".to_string(),
            });
        }

        let api_key = if config.api_key.trim().is_empty() {
            None
        } else {
            Some(config.api_key.clone())
        };

        Ok(Self {
            client: CompatClient::new(
                PROVIDER_ID,
                base_url,
                api_key,
                config.model.clone(),
                config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            ),
        })
    }
}

#[async_trait]
impl ChatProvider for CustomProvider {
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

impl std::fmt::Debug for CustomProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomProvider")
            .field("client", &self.client)
            .finish()
    }
}
