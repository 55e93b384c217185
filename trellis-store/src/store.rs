//! The project store: document lifecycle against one project directory.
//!
//! Load runs migration then validation before the typed decode, so callers
//! only ever see documents that conform to the current schema. Save
//! validates first and writes through a temp file so a crash mid-write
//! leaves the previous valid document intact.

use crate::checkpoints::CheckpointManager;
use crate::{deserialize_error, io_error, migration, serialize_error, validation};
use chrono::Utc;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use trellis_core::{ProjectData, StoreError, TrellisError, TrellisResult};
use uuid::Uuid;

/// Project document file name.
pub const PROJECT_FILE: &str = "project.json";

/// Load/save/checkpoint surface for project documents.
///
/// Every method accepts either the project directory or the `project.json`
/// path itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectStore {
    checkpoints: CheckpointManager,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a directory-or-file path to the project file path.
    pub fn project_file(path: &Path) -> PathBuf {
        if path.file_name().is_some_and(|name| name == PROJECT_FILE) {
            path.to_path_buf()
        } else {
            path.join(PROJECT_FILE)
        }
    }

    /// Initialize a fresh, empty document. Refuses to overwrite an existing
    /// project.
    pub fn create(&self, path: &Path, name: &str) -> TrellisResult<ProjectData> {
        let file = Self::project_file(path);
        if file.exists() {
            return Err(TrellisError::Store(StoreError::ProjectExists {
                path: file.display().to_string(),
            }));
        }
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|error| io_error(parent, &error))?;
        }

        let data = ProjectData::new(name);
        let saved = self.save(path, &data)?;
        info!(project = name, path = %file.display(), "created project");
        Ok(saved)
    }

    /// Read, migrate, validate, and decode the document.
    pub fn load(&self, path: &Path) -> TrellisResult<ProjectData> {
        let file = Self::project_file(path);
        if !file.exists() {
            return Err(TrellisError::Store(StoreError::ProjectNotFound {
                path: file.display().to_string(),
            }));
        }

        let content = fs::read_to_string(&file).map_err(|error| io_error(&file, &error))?;
        let raw: Value = serde_json::from_str(&content).map_err(deserialize_error)?;
        let migrated = migration::migrate(raw);
        validation::validate_document(&migrated).into_result()?;

        let data = serde_json::from_value(migrated).map_err(deserialize_error)?;
        debug!(path = %file.display(), "loaded project");
        Ok(data)
    }

    /// Validate, stamp `last_modified`, and write atomically. Returns the
    /// document exactly as persisted.
    pub fn save(&self, path: &Path, data: &ProjectData) -> TrellisResult<ProjectData> {
        let file = Self::project_file(path);

        let value = serde_json::to_value(data).map_err(serialize_error)?;
        validation::validate_document(&value).into_result()?;

        let mut stamped = data.clone();
        stamped.meta.last_modified = Utc::now();

        let json = serde_json::to_string_pretty(&stamped).map_err(serialize_error)?;
        let tmp = file.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|error| io_error(&tmp, &error))?;
        fs::rename(&tmp, &file).map_err(|error| io_error(&file, &error))?;
        debug!(path = %file.display(), "saved project");
        Ok(stamped)
    }

    /// Checkpoint the current on-disk document. Returns the checkpoint id.
    pub fn create_snapshot(&self, path: &Path, description: &str) -> TrellisResult<Uuid> {
        let project = self.load(path)?;
        let file = Self::project_file(path);
        self.checkpoints.create(&file, &project, description)
    }

    /// Restore and persist the most recent checkpoint. `None` when no
    /// checkpoint exists; the document on disk is left untouched then.
    pub fn rollback(&self, path: &Path) -> TrellisResult<Option<ProjectData>> {
        let file = Self::project_file(path);
        match self.checkpoints.latest(&file)? {
            Some(checkpoint) => {
                let restored = self.save(path, &checkpoint.project)?;
                info!(checkpoint = %checkpoint.id, "rolled back to latest checkpoint");
                Ok(Some(restored))
            }
            None => Ok(None),
        }
    }

    /// The checkpoint log for direct inspection.
    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }
}

// ============================================================================
// TESTS
// ============================================================================
