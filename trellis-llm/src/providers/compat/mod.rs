//! OpenAI-compatible transport shared by every vendor.

pub mod client;
pub mod types;

pub use client::{CompatClient, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
