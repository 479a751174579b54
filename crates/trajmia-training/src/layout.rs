use crate::error::TrainingResult;
use crate::role::RunKind;
use std::path::{Path, PathBuf};

/// Filesystem layout for run artifacts.
///
/// One directory per `(seed, run)` under the root:
/// `<root>/<seed>/<run>/{epoch_<e>.json, final.json, trajectory.json}`.
#[derive(Debug, Clone)]
pub struct TrainingLayout {
    root: PathBuf,
}

impl TrainingLayout {
    pub const FINAL_CHECKPOINT: &'static str = "final.json";
    pub const TRAJECTORY: &'static str = "trajectory.json";

    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn run_dir(&self, seed: u64, run: RunKind) -> PathBuf {
        self.root.join(seed.to_string()).join(run.as_str())
    }

    #[must_use]
    pub fn epoch_checkpoint_path(&self, seed: u64, run: RunKind, epoch: u32) -> PathBuf {
        self.run_dir(seed, run).join(format!("epoch_{epoch}.json"))
    }

    #[must_use]
    pub fn final_checkpoint_path(&self, seed: u64, run: RunKind) -> PathBuf {
        self.run_dir(seed, run).join(Self::FINAL_CHECKPOINT)
    }

    #[must_use]
    pub fn trajectory_path(&self, seed: u64, run: RunKind) -> PathBuf {
        self.run_dir(seed, run).join(Self::TRAJECTORY)
    }

    /// Final checkpoint of the model a distillation run learns from, or
    /// `None` for direct runs.
    #[must_use]
    pub fn teacher_checkpoint_path(&self, teacher_seed: u64, run: RunKind) -> Option<PathBuf> {
        let teacher = RunKind::direct(run.teacher_role()?)?;
        Some(self.final_checkpoint_path(teacher_seed, teacher))
    }

    pub fn ensure_run_dir(&self, seed: u64, run: RunKind) -> TrainingResult<PathBuf> {
        let dir = self.run_dir(seed, run);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
