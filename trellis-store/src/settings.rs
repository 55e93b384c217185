//! Application settings persistence.

use crate::{deserialize_error, io_error, serialize_error};
use std::fs;
use std::path::PathBuf;
use tracing::debug;
use trellis_core::{AppSettings, TrellisResult};

/// Default settings file name.
pub const SETTINGS_FILE: &str = "settings.json";

/// Loads and saves the application settings file.
///
/// A missing file means defaults; a corrupt file is an error (settings hold
/// credentials, silently resetting them would be worse than failing).
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn load(&self) -> TrellisResult<AppSettings> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no settings file, using defaults");
            return Ok(AppSettings::default());
        }
        let content =
            fs::read_to_string(&self.path).map_err(|error| io_error(&self.path, &error))?;
        let settings = serde_json::from_str(&content).map_err(deserialize_error)?;
        Ok(settings)
    }

    /// Validate and persist. Invalid settings are refused.
    pub fn save(&self, settings: &AppSettings) -> TrellisResult<()> {
        settings.validate()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| io_error(parent, &error))?;
        }
        let json = serde_json::to_string_pretty(settings).map_err(serialize_error)?;
        fs::write(&self.path, json).map_err(|error| io_error(&self.path, &error))?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
