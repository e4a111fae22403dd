//! Suspended-run checkpoints

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{RunConfig, RunState};
use crate::error::{GoalrunError, Result};

/// Everything needed to resume a run after a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub config: RunConfig,
    pub state: RunState,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(config: RunConfig, state: RunState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            config,
            state,
            saved_at: Utc::now(),
        }
    }
}

/// Checkpoint persistence
pub trait CheckpointStore: Send + Sync {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    fn load(&self, run_id: &str) -> Result<Option<Checkpoint>>;

    /// Deleting a missing checkpoint is not an error
    fn delete(&self, run_id: &str) -> Result<()>;

    /// All checkpoints, oldest first
    fn list(&self) -> Result<Vec<Checkpoint>>;
}

/// One JSON file per run: `<dir>/<run_id>.json`
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: &str) -> Result<PathBuf> {
        if !is_safe_id(run_id) {
            return Err(GoalrunError::Checkpoint(format!("invalid run id for checkpoint: '{}'", run_id)));
        }
        Ok(self.dir.join(format!("{}.json", run_id)))
    }
}

/// Run ids double as file names
pub(crate) fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.path_for(&checkpoint.run_id)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(checkpoint)?)?;
        fs::rename(&tmp, &path)?;
        log::debug!("saved checkpoint {}", path.display());
        Ok(())
    }

    fn load(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(run_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let checkpoint = serde_json::from_slice(&bytes)
            .map_err(|e| GoalrunError::Checkpoint(format!("corrupt checkpoint {}: {}", path.display(), e)))?;
        Ok(Some(checkpoint))
    }

    fn delete(&self, run_id: &str) -> Result<()> {
        let path = self.path_for(run_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<Checkpoint>> {
        let mut checkpoints = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path)
                .map_err(GoalrunError::from)
                .and_then(|bytes| serde_json::from_slice::<Checkpoint>(&bytes).map_err(GoalrunError::from))
            {
                Ok(checkpoint) => checkpoints.push(checkpoint),
                Err(e) => log::warn!("skipping unreadable checkpoint {}: {}", path.display(), e),
            }
        }
        checkpoints.sort_by(|a, b| a.saved_at.cmp(&b.saved_at));
        Ok(checkpoints)
    }
}
