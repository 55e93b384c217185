//! Session chat log, kept beside the project file.
//!
//! The log is diagnostics, not the source of truth (the document's own
//! `chat_history` is). Reads and writes are therefore best-effort: a missing
//! or damaged log starts fresh with a warning, and a failed write never
//! aborts the turn that produced it.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use trellis_core::ConversationMessage;

/// Log file name, stored in the project directory.
pub const CHAT_LOG_FILE: &str = "chat-history.json";

/// Append-only conversation log for one project.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatLog;

impl ChatLog {
    pub fn new() -> Self {
        Self
    }

    fn log_path(project_file: &Path) -> PathBuf {
        match project_file.parent() {
            Some(parent) => parent.join(CHAT_LOG_FILE),
            None => PathBuf::from(CHAT_LOG_FILE),
        }
    }

    /// Append one entry via read-modify-write.
    pub fn append(&self, project_file: &Path, message: &ConversationMessage) {
        let path = Self::log_path(project_file);
        let mut entries = self.read(project_file);
        entries.push(message.clone());

        match serde_json::to_string_pretty(&entries) {
            Ok(json) => {
                if let Err(error) = fs::write(&path, json) {
                    warn!(path = %path.display(), error = %error, "failed to write chat log");
                }
            }
            Err(error) => {
                warn!(error = %error, "failed to serialize chat log");
            }
        }
    }

    /// All logged entries. Missing or unreadable logs yield an empty list.
    pub fn read(&self, project_file: &Path) -> Vec<ConversationMessage> {
        let path = Self::log_path(project_file);
        if !path.exists() {
            return Vec::new();
        }
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "failed to read chat log, starting fresh");
                return Vec::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "corrupt chat log, starting fresh");
                Vec::new()
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
