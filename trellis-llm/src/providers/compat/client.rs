//! Shared HTTP transport for OpenAI-compatible chat endpoints.

use super::types::{
    ApiError, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ModelsResponse,
    WireMessage,
};
use crate::providers::{empty_response, invalid_response, rate_limited, request_failed, timed_out};
use crate::{ChatMessage, ChatResponse, TokenUsage};
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, StatusCode};
use reqwest_eventsource::{Error as SseError, Event, EventSource};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use trellis_core::{CancelToken, TrellisError, TrellisResult};

/// Sampling temperature used when the settings leave it unset.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Completion token cap used when the settings leave it unset.
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Ceiling for a single non-streaming completion round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// Ceiling for cheap probes like model listing.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for one configured OpenAI-compatible endpoint.
///
/// Vendors wrap this with their own id, base URL and credential rules; the
/// wire handling (auth header, status mapping, SSE decoding, cancellation)
/// is identical across all of them.
pub struct CompatClient {
    client: Client,
    provider_id: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl CompatClient {
    pub fn new(
        provider_id: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            provider_id: provider_id.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature,
            max_tokens,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a prompt and wait for the complete response.
    pub async fn send_chat(
        &self,
        messages: &[ChatMessage],
        cancel: &CancelToken,
    ) -> TrellisResult<ChatResponse> {
        let request = self.completion_request(messages, false);

        let call = async {
            let response = self
                .authorize(
                    self.client
                        .post(self.completions_url())
                        .timeout(REQUEST_TIMEOUT),
                )
                .json(&request)
                .send()
                .await
                .map_err(|error| self.transport_error(error))?;
            self.decode_completion(response).await
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(TrellisError::Cancelled),
            result = call => result,
        }
    }

    /// Stream a completion over SSE, forwarding each content delta through
    /// `chunk_tx` and returning the accumulated text. Token usage is not
    /// reported on the streaming path.
    pub async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        chunk_tx: UnboundedSender<String>,
        cancel: &CancelToken,
    ) -> TrellisResult<ChatResponse> {
        let request = self.completion_request(messages, true);
        let builder = self
            .authorize(self.client.post(self.completions_url()))
            .json(&request);
        let mut source = EventSource::new(builder).map_err(|error| {
            invalid_response(
                &self.provider_id,
                format!("Failed to open event stream: {}", error),
            )
        })?;

        let mut content = String::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    source.close();
                    return Err(TrellisError::Cancelled);
                }
                event = source.next() => match event {
                    Some(Ok(Event::Open)) => {}
                    Some(Ok(Event::Message(message))) => {
                        if message.data == "[DONE]" {
                            source.close();
                            break;
                        }
                        match serde_json::from_str::<ChatCompletionChunk>(&message.data) {
                            Ok(chunk) => {
                                let delta = chunk
                                    .choices
                                    .into_iter()
                                    .next()
                                    .and_then(|choice| choice.delta.content);
                                if let Some(delta) = delta {
                                    if !delta.is_empty() {
                                        content.push_str(&delta);
                                        // A dropped receiver only means nobody
                                        // is watching; keep accumulating.
                                        let _ = chunk_tx.send(delta);
                                    }
                                }
                            }
                            Err(error) => {
                                debug!(error = %error, "skipping undecodable stream event");
                            }
                        }
                    }
                    Some(Err(SseError::StreamEnded)) => {
                        source.close();
                        break;
                    }
                    Some(Err(error)) => {
                        source.close();
                        return Err(self.stream_error(error).await);
                    }
                    None => break,
                }
            }
        }

        Ok(ChatResponse {
            content,
            usage: None,
        })
    }

    /// List the model ids the endpoint advertises.
    pub async fn list_models(&self) -> TrellisResult<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorize(self.client.get(&url).timeout(PROBE_TIMEOUT))
            .send()
            .await
            .map_err(|error| self.transport_error(error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(request_failed(
                &self.provider_id,
                status.as_u16() as i32,
                "Model listing failed",
            ));
        }

        let models: ModelsResponse = response.json().await.map_err(|error| {
            invalid_response(
                &self.provider_id,
                format!("Failed to parse model list: {}", error),
            )
        })?;
        Ok(models.data.into_iter().map(|entry| entry.id).collect())
    }

    /// Whether the endpoint answers at all.
    pub async fn probe(&self) -> bool {
        self.list_models().await.is_ok()
    }

    fn completion_request(&self, messages: &[ChatMessage], stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: wire_messages(messages),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            stream: stream.then_some(true),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> TrellisError {
        if error.is_timeout() {
            timed_out(&self.provider_id)
        } else {
            request_failed(
                &self.provider_id,
                0,
                format!("HTTP request failed: {}", error),
            )
        }
    }

    async fn decode_completion(&self, response: reqwest::Response) -> TrellisResult<ChatResponse> {
        let status = response.status();
        let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);

        if status.is_success() {
            let completion: ChatCompletionResponse = response.json().await.map_err(|error| {
                invalid_response(
                    &self.provider_id,
                    format!("Failed to parse response: {}", error),
                )
            })?;
            let usage = completion.usage.map(|usage| TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
            let content = completion
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or_else(|| empty_response(&self.provider_id))?;
            Ok(ChatResponse { content, usage })
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = match serde_json::from_str::<ApiError>(&error_text) {
                Ok(api_error) => api_error.error.message,
                Err(_) => error_text,
            };

            Err(match status {
                StatusCode::TOO_MANY_REQUESTS => rate_limited(&self.provider_id, retry_after_ms),
                _ => request_failed(&self.provider_id, status.as_u16() as i32, message),
            })
        }
    }

    async fn stream_error(&self, error: SseError) -> TrellisError {
        match error {
            SseError::InvalidStatusCode(status, response) => {
                let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);
                if status == StatusCode::TOO_MANY_REQUESTS {
                    return rate_limited(&self.provider_id, retry_after_ms);
                }
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                let message = match serde_json::from_str::<ApiError>(&error_text) {
                    Ok(api_error) => api_error.error.message,
                    Err(_) => error_text,
                };
                request_failed(&self.provider_id, status.as_u16() as i32, message)
            }
            SseError::Transport(error) => self.transport_error(error),
            other => request_failed(
                &self.provider_id,
                0,
                format!("Event stream failed: {}", other),
            ),
        }
    }
}

fn wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|message| WireMessage {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        })
        .collect()
}

fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<i64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<f64>().ok())
        .map(|seconds| (seconds * 1000.0) as i64)
}

impl std::fmt::Debug for CompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompatClient")
            .field("provider_id", &self.provider_id)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .finish()
    }
}
