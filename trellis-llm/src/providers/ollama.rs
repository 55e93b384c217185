//! Ollama chat provider.
//!
//! Ollama serves the OpenAI-compatible dialect under `/v1` while its native
//! endpoints (reachability, installed models) live at the server root. No
//! real API key exists; the compatible surface still wants a bearer token,
//! so a stub value is sent.

use super::compat::{CompatClient, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::{ChatMessage, ChatProvider, ChatResponse};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;
use trellis_core::{CancelToken, ConfigError, ProviderConfig, TrellisResult};

const PROVIDER_ID: &str = "ollama";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const STUB_API_KEY: &str = "ollama";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct OllamaProvider {
    client: CompatClient,
    /// Server root, without the `/v1` suffix; used for native endpoints.
    root_url: String,
    http: reqwest::Client,
}

impl OllamaProvider {
    /// Build from settings. Needs a model; key and URL have local defaults.
    pub fn try_new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        if config.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "llm.ollama.model".to_string(),
            });
        }

        let configured = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let (root_url, v1_url) = split_urls(configured);
        let api_key = if config.api_key.trim().is_empty() {
            STUB_API_KEY.to_string()
        } else {
            config.api_key.clone()
        };

        Ok(Self {
            client: CompatClient::new(
                PROVIDER_ID,
                v1_url,
                Some(api_key),
                config.model.clone(),
                config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            ),
            root_url,
            http: reqwest::Client::new(),
        })
    }

    /// Models installed on the server, via the native tag listing.
    /// Failures degrade to an empty list; this feeds a settings picker,
    /// not a turn.
    pub async fn installed_models(&self) -> Vec<String> {
        let url = format!("{}/api/tags", self.root_url);
        let response = match self.http.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, "ollama server unreachable");
                return Vec::new();
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "ollama tag listing failed");
            return Vec::new();
        }
        match response.json::<TagsResponse>().await {
            Ok(tags) => tags.models.into_iter().map(|model| model.name).collect(),
            Err(error) => {
                warn!(error = %error, "failed to parse ollama tag list");
                Vec::new()
            }
        }
    }
}

/// Normalize a configured URL into (server root, `/v1` chat base).
fn split_urls(configured: &str) -> (String, String) {
    let trimmed = configured.trim_end_matches('/');
    match trimmed.strip_suffix("/v1") {
        Some(root) => (root.to_string(), trimmed.to_string()),
        None => (trimmed.to_string(), format!("{}/v1", trimmed)),
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
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

    /// A plain GET against the server root; Ollama answers it with 200.
    async fn test_connection(&self) -> bool {
        match self
            .http
            .get(&self.root_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("root_url", &self.root_url)
            .field("client", &self.client)
            .finish()
    }
}

// Native tag-listing wire types.

#[derive(Debug, Clone, Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Debug, Clone, Deserialize)]
struct TagModel {
    name: String,
}
