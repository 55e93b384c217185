//! Error types for Trellis.
//!
//! Each domain gets its own error enum; `TrellisError` is the top-level
//! error that wraps them all and is what crosses crate boundaries.

use thiserror::Error;

// ============================================================================
// CONFIG ERRORS
// ============================================================================

/// Errors raised while loading or validating settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required field is missing or empty.
    #[error("Missing required config field: {field}")]
    MissingRequired { field: String },

    /// A field is present but holds a value outside its allowed range.
    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// The configured provider identifier is not one we know how to build.
    #[error("Provider not supported: {provider}")]
    ProviderNotSupported { provider: String },
}

// ============================================================================
// PROVIDER ERRORS
// ============================================================================

/// Errors raised by LLM and search providers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The HTTP request itself failed or came back non-2xx.
    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    /// The provider returned 429. `retry_after_ms` is 0 when the server
    /// did not say how long to wait.
    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    /// The provider answered with zero choices.
    #[error("Empty response from {provider}: no choices returned")]
    EmptyResponse { provider: String },

    /// The request timed out before the provider answered.
    #[error("Request to {provider} timed out")]
    Timeout { provider: String },
}

// ============================================================================
// STORE ERRORS
// ============================================================================

/// Errors raised by the on-disk project store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("IO error at {path}: {reason}")]
    Io { path: String, reason: String },

    /// No project document exists at the given path.
    #[error("Project not found at {path}")]
    ProjectNotFound { path: String },

    /// A project document already exists where a new one would be created.
    #[error("Project already exists at {path}")]
    ProjectExists { path: String },

    /// Serializing a document to JSON failed.
    #[error("Serialization failed: {reason}")]
    Serialize { reason: String },

    /// Parsing a document from JSON failed.
    #[error("Deserialization failed: {reason}")]
    Deserialize { reason: String },
}

// ============================================================================
// VALIDATION ERRORS
// ============================================================================

/// Errors raised when a project document fails schema validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required document field is missing or empty.
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    /// A field holds a value the schema does not allow.
    #[error("Invalid value at {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// The document violated the schema in one or more places.
    #[error("Schema validation failed: {}", .issues.join("; "))]
    SchemaViolation { issues: Vec<String> },
}

// ============================================================================
// TOP-LEVEL ERROR
// ============================================================================

/// Top-level Trellis error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrellisError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The in-flight turn was cancelled cooperatively.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Convenience alias used across all Trellis crates.
pub type TrellisResult<T> = Result<T, TrellisError>;
