//! Run checkpoints
//!
//! A checkpoint is the state after a completed stage plus the stage to run
//! next, keyed by run id. Saving the same run again replaces the latest
//! snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{LoopError, Result};
use crate::stage::Stage;
use crate::state::TaskState;

/// Persisted snapshot of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    /// Stage to execute on resume
    pub next: Stage,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(run_id: impl Into<String>, next: Stage, state: TaskState) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            next,
            state,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.next.is_terminal()
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            run_id: self.run_id.clone(),
            task: self.state.task().to_string(),
            next: self.next,
            revision_number: self.state.revision_number(),
            max_revisions: self.state.max_revisions(),
            updated_at: self.updated_at,
        }
    }
}

/// Lightweight description of a run for listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub run_id: String,
    pub task: String,
    pub next: Stage,
    pub revision_number: i64,
    pub max_revisions: i64,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointSummary {
    /// Format as a short one-line description
    pub fn short_description(&self) -> String {
        let task = if self.task.chars().count() > 50 {
            format!("{}...", self.task.chars().take(47).collect::<String>())
        } else {
            self.task.clone()
        };

        format!(
            "{} [{} rev {}/{}] {} ({})",
            self.run_id,
            self.next,
            self.revision_number,
            self.max_revisions,
            task,
            self.updated_at.format("%Y-%m-%d %H:%M")
        )
    }
}

/// Storage for run checkpoints
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Save the latest checkpoint for a run
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Load the latest checkpoint for a run
    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>>;

    /// All runs, most recently updated first
    async fn list(&self) -> Result<Vec<CheckpointSummary>>;

    /// Remove a run's checkpoints
    async fn delete(&self, run_id: &str) -> Result<()>;
}

/// In-memory store that keeps every snapshot of each run
#[derive(Default, Clone)]
pub struct MemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot saved for a run, oldest first
    pub async fn history(&self, run_id: &str) -> Vec<Checkpoint> {
        let store = self.checkpoints.read().await;
        store.get(run_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut store = self.checkpoints.write().await;
        store
            .entry(checkpoint.run_id.clone())
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let store = self.checkpoints.read().await;
        Ok(store.get(run_id).and_then(|c| c.last()).cloned())
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>> {
        let store = self.checkpoints.read().await;
        let mut runs: Vec<_> = store
            .values()
            .filter_map(|c| c.last())
            .map(Checkpoint::summary)
            .collect();
        runs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(runs)
    }

    async fn delete(&self, run_id: &str) -> Result<()> {
        let mut store = self.checkpoints.write().await;
        store.remove(run_id);
        Ok(())
    }
}

/// One pretty-printed JSON file per run
pub struct FileCheckpointStore {
    base_dir: PathBuf,
}

impl FileCheckpointStore {
    /// Store under the platform data directory (`<data_local_dir>/essay/runs`)
    pub async fn new() -> Result<Self> {
        Self::with_dir(default_runs_dir()?).await
    }

    /// Store under a specific directory, creating it if needed
    pub async fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = dir.into();
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| checkpoint_error("create run directory", &base_dir, e))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", run_id))
    }

    async fn exists(path: &Path) -> Result<bool> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| checkpoint_error("check", path, e))
    }

    async fn read(path: &Path) -> Result<Checkpoint> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| checkpoint_error("read", path, e))?;
        serde_json::from_str(&json).map_err(|e| checkpoint_error("parse", path, e))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        validate_run_id(&checkpoint.run_id)?;
        let path = self.run_path(&checkpoint.run_id);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| LoopError::Checkpoint(format!("Failed to serialize checkpoint: {}", e)))?;

        // Write-then-rename so a crash never leaves a half-written run file
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| checkpoint_error("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| checkpoint_error("write", &path, e))?;

        debug!(run_id = %checkpoint.run_id, next = %checkpoint.next, "Saved checkpoint");
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        validate_run_id(run_id)?;
        let path = self.run_path(run_id);
        if !Self::exists(&path).await? {
            return Ok(None);
        }
        Self::read(&path).await.map(Some)
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>> {
        let mut runs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| checkpoint_error("list", &self.base_dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| checkpoint_error("list", &self.base_dir, e))?
        {
            let path = entry.path();
            if path.extension().map_or(false, |e| e == "json") {
                match Self::read(&path).await {
                    Ok(checkpoint) => runs.push(checkpoint.summary()),
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint"),
                }
            }
        }

        runs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(runs)
    }

    async fn delete(&self, run_id: &str) -> Result<()> {
        validate_run_id(run_id)?;
        let path = self.run_path(run_id);
        if !Self::exists(&path).await? {
            return Err(LoopError::RunNotFound(run_id.to_string()));
        }
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| checkpoint_error("delete", &path, e))?;
        info!(run_id = %run_id, "Deleted run");
        Ok(())
    }
}

fn checkpoint_error(action: &str, path: &Path, e: impl std::fmt::Display) -> LoopError {
    LoopError::Checkpoint(format!("Failed to {} {}: {}", action, path.display(), e))
}

/// Run ids become file names, so keep them to a safe alphabet
fn validate_run_id(run_id: &str) -> Result<()> {
    let valid = !run_id.is_empty()
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(LoopError::InvalidConfiguration(format!(
            "invalid run id: {:?}",
            run_id
        )))
    }
}

/// Default directory for run checkpoints
pub fn default_runs_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .ok_or_else(|| LoopError::Checkpoint("Could not find data directory".to_string()))?;

    Ok(data_dir.join("essay").join("runs"))
}
