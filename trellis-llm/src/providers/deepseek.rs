//! DeepSeek chat provider.
//!
//! DeepSeek exposes the OpenAI-compatible dialect at its own host, so the
//! provider is the baseline shape with different defaults.

use super::compat::{CompatClient, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::{ChatMessage, ChatProvider, ChatResponse};
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use trellis_core::{CancelToken, ConfigError, ProviderConfig, TrellisResult};

const PROVIDER_ID: &str = "deepseek";
const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

#[derive(Debug)]
pub struct DeepSeekProvider {
    client: CompatClient,
}

impl DeepSeekProvider {
    /// Build from settings, failing fast when required fields are missing.
    pub fn try_new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "llm.deepseek.api_key".to_string(),
            });
        }
        if config.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "llm.deepseek.model".to_string(),
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
impl ChatProvider for DeepSeekProvider {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_new_applies_deepseek_defaults() {
        let config = ProviderConfig {
            api_key: "ds-test".to_string(),
            model: "deepseek-chat".to_string(),
            ..ProviderConfig::default()
        };
        let provider = DeepSeekProvider::try_new(&config).unwrap();
        assert_eq!(provider.provider_id(), "deepseek");
        assert_eq!(provider.client.base_url(), "https://api.deepseek.com");
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let config = ProviderConfig {
            model: "deepseek-chat".to_string(),
            ..ProviderConfig::default()
        };
        let err = DeepSeekProvider::try_new(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref field } if field == "llm.deepseek.api_key"));
    }
}
