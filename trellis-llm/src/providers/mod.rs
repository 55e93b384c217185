//! Chat provider implementations.
//!
//! Each vendor module owns its credential rules and base URL defaults; the
//! actual wire handling is shared through [`compat`].

pub mod compat;
pub mod custom;
pub mod deepseek;
pub mod ollama;
pub mod openai;

pub use custom::CustomProvider;
pub use deepseek::DeepSeekProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use trellis_core::{ProviderError, TrellisError};

pub(crate) fn request_failed(
    provider: &str,
    status: i32,
    message: impl Into<String>,
) -> TrellisError {
    TrellisError::Provider(ProviderError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    })
}

pub(crate) fn rate_limited(provider: &str, retry_after_ms: i64) -> TrellisError {
    TrellisError::Provider(ProviderError::RateLimited {
        provider: provider.to_string(),
        retry_after_ms,
    })
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> TrellisError {
    TrellisError::Provider(ProviderError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    })
}

pub(crate) fn empty_response(provider: &str) -> TrellisError {
    TrellisError::Provider(ProviderError::EmptyResponse {
        provider: provider.to_string(),
    })
}

pub(crate) fn timed_out(provider: &str) -> TrellisError {
    TrellisError::Provider(ProviderError::Timeout {
        provider: provider.to_string(),
    })
}
