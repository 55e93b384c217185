//! TRELLIS Core - Shared Types
//!
//! Data model, error taxonomy, settings, and the cancellation primitive for
//! the Trellis workspace. All other crates depend on this.

pub mod cancel;
pub mod config;
pub mod entities;
pub mod error;

pub use cancel::CancelToken;
pub use config::{AppSettings, LlmSettings, ProjectSettings, ProviderConfig, SearchSettings};
pub use entities::{
    epoch_millis_now, new_node_id, Checkpoint, ConversationMessage, EpochMillis, GuidanceData,
    GuidanceIntent, GuidanceOption, MovePosition, NodeDraft, NodeId, NodeType, OpAction,
    Operation, ProjectData, ProjectMeta, ProjectNode, Role, SearchRequest, SearchResult,
    SpecValue, Timestamp, SCHEMA_VERSION,
};
pub use error::{
    ConfigError, ProviderError, StoreError, TrellisError, TrellisResult, ValidationError,
};
