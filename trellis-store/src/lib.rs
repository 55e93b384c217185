//! TRELLIS Store - Project Persistence
//!
//! Owns the on-disk lifecycle of a project: create, load (with migration and
//! validation), atomic save, checkpoints with rollback, the session chat
//! log, and the application settings file.

pub mod chatlog;
pub mod checkpoints;
pub mod migration;
pub mod settings;
pub mod store;
pub mod validation;

pub use chatlog::{ChatLog, CHAT_LOG_FILE};
pub use checkpoints::{CheckpointManager, CHECKPOINT_CAP};
pub use migration::migrate;
pub use settings::{SettingsStore, SETTINGS_FILE};
pub use store::{ProjectStore, PROJECT_FILE};
pub use validation::{validate_document, Severity, ValidationIssue, ValidationResult};

use std::path::Path;
use trellis_core::{StoreError, TrellisError};

pub(crate) fn io_error(path: &Path, error: &std::io::Error) -> TrellisError {
    TrellisError::Store(StoreError::Io {
        path: path.display().to_string(),
        reason: error.to_string(),
    })
}

pub(crate) fn serialize_error(error: serde_json::Error) -> TrellisError {
    TrellisError::Store(StoreError::Serialize {
        reason: error.to_string(),
    })
}

pub(crate) fn deserialize_error(error: serde_json::Error) -> TrellisError {
    TrellisError::Store(StoreError::Deserialize {
        reason: error.to_string(),
    })
}
