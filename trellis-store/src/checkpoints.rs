//! Checkpoint log for project documents.
//!
//! Snapshots live in a `.checkpoints` directory beside the project file, one
//! JSON file per checkpoint. File names start with a fixed-width UTC stamp
//! (colons and dots replaced for filesystem friendliness) so a plain
//! lexicographic sort is chronological.

use crate::{deserialize_error, io_error, serialize_error};
use chrono::{SecondsFormat, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use trellis_core::{epoch_millis_now, new_node_id, Checkpoint, ProjectData, TrellisResult};
use uuid::Uuid;

/// Checkpoints retained per project; older ones are pruned.
pub const CHECKPOINT_CAP: usize = 20;

const CHECKPOINT_DIR: &str = ".checkpoints";

/// Manages the checkpoint directory beside one project file.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointManager;

impl CheckpointManager {
    pub fn new() -> Self {
        Self
    }

    fn dir_for(project_file: &Path) -> PathBuf {
        match project_file.parent() {
            Some(parent) => parent.join(CHECKPOINT_DIR),
            None => PathBuf::from(CHECKPOINT_DIR),
        }
    }

    /// Snapshot a document, then prune to the cap. Returns the checkpoint id.
    pub fn create(
        &self,
        project_file: &Path,
        project: &ProjectData,
        description: &str,
    ) -> TrellisResult<Uuid> {
        let dir = Self::dir_for(project_file);
        fs::create_dir_all(&dir).map_err(|error| io_error(&dir, &error))?;

        let checkpoint = Checkpoint {
            id: new_node_id(),
            timestamp: epoch_millis_now(),
            description: description.to_string(),
            project: project.clone(),
        };

        let stamp = Utc::now()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace(':', "-")
            .replace('.', "-");
        let file = dir.join(format!("{}_{}.json", stamp, checkpoint.id));

        let json = serde_json::to_string_pretty(&checkpoint).map_err(serialize_error)?;
        fs::write(&file, json).map_err(|error| io_error(&file, &error))?;
        debug!(file = %file.display(), description, "checkpoint written");

        self.prune(project_file, CHECKPOINT_CAP)?;
        Ok(checkpoint.id)
    }

    /// Delete the oldest entries beyond `cap`.
    pub fn prune(&self, project_file: &Path, cap: usize) -> TrellisResult<()> {
        let files = Self::sorted_entries(&Self::dir_for(project_file))?;
        if files.len() <= cap {
            return Ok(());
        }
        let excess = files.len() - cap;
        for file in &files[..excess] {
            fs::remove_file(file).map_err(|error| io_error(file, &error))?;
        }
        info!(pruned = excess, cap, "pruned old checkpoints");
        Ok(())
    }

    /// The most recent checkpoint, or `None` when none exist.
    pub fn latest(&self, project_file: &Path) -> TrellisResult<Option<Checkpoint>> {
        let files = Self::sorted_entries(&Self::dir_for(project_file))?;
        let Some(newest) = files.last() else {
            return Ok(None);
        };
        let content = fs::read_to_string(newest).map_err(|error| io_error(newest, &error))?;
        let checkpoint = serde_json::from_str(&content).map_err(deserialize_error)?;
        Ok(Some(checkpoint))
    }

    /// Number of checkpoints currently on disk.
    pub fn count(&self, project_file: &Path) -> TrellisResult<usize> {
        Ok(Self::sorted_entries(&Self::dir_for(project_file))?.len())
    }

    fn sorted_entries(dir: &Path) -> TrellisResult<Vec<PathBuf>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let reader = fs::read_dir(dir).map_err(|error| io_error(dir, &error))?;
        let mut files = Vec::new();
        for entry in reader {
            let entry = entry.map_err(|error| io_error(dir, &error))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

// ============================================================================
// TESTS
// ============================================================================
