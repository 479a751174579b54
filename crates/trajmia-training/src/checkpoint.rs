//! Checkpoints, metric histories and their persistence.

use crate::error::{TrainingError, TrainingResult};
use crate::layout::TrainingLayout;
use crate::role::RunKind;
use crate::trajectory::Trajectory;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use trajmia_abstraction::{Classifier, ParameterSnapshot};
use walkdir::WalkDir;

/// Model parameters and trajectory as of the end of `epoch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run: RunKind,
    pub seed: u64,
    pub epoch: u32,
    pub parameters: Vec<ParameterSnapshot>,
    pub trajectory: Trajectory,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Snapshots `model` after the last epoch of `trajectory`.
    #[must_use]
    pub fn capture(run: RunKind, seed: u64, model: &dyn Classifier, trajectory: &Trajectory) -> Self {
        Self {
            run,
            seed,
            epoch: trajectory.last_epoch(),
            parameters: model.snapshot(),
            trajectory: trajectory.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn restore_into(&self, model: &mut dyn Classifier) -> TrainingResult<()> {
        model.restore(&self.parameters).map_err(|source| TrainingError::Model {
            run: self.run,
            epoch: self.epoch,
            batch: None,
            source,
        })
    }

    /// Checks that the checkpoint belongs to `run` and is internally
    /// consistent.
    pub fn validate_for(&self, run: RunKind) -> TrainingResult<()> {
        if self.run != run {
            return Err(TrainingError::Checkpoint(format!("checkpoint of a {} run cannot resume a {run} run", self.run)));
        }
        if self.trajectory.last_epoch() != self.epoch {
            return Err(TrainingError::Checkpoint(format!(
                "checkpoint at epoch {} holds a trajectory ending at epoch {}",
                self.epoch,
                self.trajectory.last_epoch()
            )));
        }
        Ok(())
    }
}

/// Trajectory file kept current after every epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricHistory {
    pub run: RunKind,
    pub seed: u64,
    pub total_time_secs: f64,
    pub trajectory: Trajectory,
}

impl MetricHistory {
    #[must_use]
    pub fn new(run: RunKind, seed: u64, trajectory: &Trajectory) -> Self {
        Self { run, seed, total_time_secs: trajectory.total_time_secs(), trajectory: trajectory.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Checkpoint,
    Trajectory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

/// Destination for checkpoints and metric histories.
///
/// Writing the same destination twice must overwrite it.
pub trait CheckpointSink: Send + Sync {
    fn persist_checkpoint(&self, checkpoint: &Checkpoint, dest: &Path) -> TrainingResult<PersistedArtifact>;

    fn persist_trajectory(&self, history: &MetricHistory, dest: &Path) -> TrainingResult<PersistedArtifact>;
}

/// Writes pretty JSON files, replacing them atomically.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsCheckpointSink;

impl FsCheckpointSink {
    fn write_json<T: Serialize>(value: &T, kind: ArtifactKind, dest: &Path) -> TrainingResult<PersistedArtifact> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(value)?;

        // Write to a sibling temp file, then rename over the destination
        let mut temp_name = dest.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
        temp_name.push(".tmp");
        let temp_path = dest.with_file_name(temp_name);
        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, dest)?;

        Ok(PersistedArtifact { kind, path: dest.to_path_buf(), sha256: sha256_file(dest)? })
    }
}

impl CheckpointSink for FsCheckpointSink {
    fn persist_checkpoint(&self, checkpoint: &Checkpoint, dest: &Path) -> TrainingResult<PersistedArtifact> {
        Self::write_json(checkpoint, ArtifactKind::Checkpoint, dest)
    }

    fn persist_trajectory(&self, history: &MetricHistory, dest: &Path) -> TrainingResult<PersistedArtifact> {
        Self::write_json(history, ArtifactKind::Trajectory, dest)
    }
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

fn load_json<T: DeserializeOwned>(path: &Path) -> TrainingResult<T> {
    let bytes = std::fs::read(path)
        .map_err(|e| TrainingError::Checkpoint(format!("cannot read {}: {e}", path.display())))?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn load_checkpoint(path: &Path) -> TrainingResult<Checkpoint> {
    load_json(path)
}

pub fn load_metric_history(path: &Path) -> TrainingResult<MetricHistory> {
    load_json(path)
}

fn checkpoint_epoch(path: &Path) -> Option<u32> {
    let stem = path.file_name()?.to_str()?.strip_suffix(".json")?;
    stem.strip_prefix("epoch_")?.parse().ok()
}

/// Highest `epoch_<e>.json` in `run_dir`, falling back to `final.json`.
///
/// Returns `None` when the directory is missing or holds no checkpoint.
pub fn latest_checkpoint(run_dir: &Path) -> TrainingResult<Option<PathBuf>> {
    if !run_dir.is_dir() {
        return Ok(None);
    }

    let mut latest: Option<(u32, PathBuf)> = None;
    for entry in WalkDir::new(run_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| TrainingError::Checkpoint(format!("cannot scan {}: {e}", run_dir.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(epoch) = checkpoint_epoch(entry.path()) {
            if latest.as_ref().is_none_or(|(best, _)| epoch > *best) {
                latest = Some((epoch, entry.into_path()));
            }
        }
    }

    if let Some((_, path)) = latest {
        return Ok(Some(path));
    }
    let final_path = run_dir.join(TrainingLayout::FINAL_CHECKPOINT);
    Ok(final_path.is_file().then_some(final_path))
}
