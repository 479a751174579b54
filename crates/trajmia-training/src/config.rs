//! Experiment configuration file support.
//!
//! An experiment is described by a TOML file:
//!
//! ```toml
//! [experiment]
//! corpus = "cifar10"
//! run = "distill_target"
//! seed = 0
//!
//! [training]
//! epochs = 100
//! learning_rate = 0.1
//!
//! [schedule]
//! kind = "milestone"
//! milestones = [50, 100]
//! gammas = [0.1, 0.1]
//! ```
//!
//! Every section except `[experiment]` may be omitted.

use crate::corpus::{CorpusDescriptor, SampleLoader};
use crate::error::{TrainingError, TrainingResult};
use crate::layout::TrainingLayout;
use crate::loader::{LoaderOptions, LoaderSet};
use crate::optim::Sgd;
use crate::partition::PARTITION_SEED;
use crate::registry::CorpusPartitions;
use crate::role::RunKind;
use crate::schedule::{CosineSchedule, LrSchedule, MilestoneSchedule};
use crate::telemetry::LogFormat;
use crate::trainer::RunContext;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub experiment: ExperimentSection,

    #[serde(default)]
    pub training: TrainingSection,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub output: OutputSection,
}

/// What is trained, on which corpus, under which seeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSection {
    /// Built-in corpus name (mnist, cifar10, cifar100, cinic10, gtsrb)
    pub corpus: String,

    pub run: RunKind,

    /// Run seed; also names the output directory
    #[serde(default)]
    pub seed: u64,

    #[serde(default = "default_partition_seed")]
    pub partition_seed: u64,

    /// Seed directory the teacher of a distillation run is loaded from
    #[serde(default)]
    pub teacher_seed: u64,
}

fn default_partition_seed() -> u64 {
    PARTITION_SEED
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    pub epochs: u32,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    /// Seed of the per-epoch train loader reshuffle
    pub loader_seed: u64,
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self { epochs: 100, batch_size: 128, learning_rate: 0.1, momentum: 0.9, weight_decay: 5e-4, loader_seed: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    #[default]
    Milestone,
    Cosine,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub kind: ScheduleKind,
    pub milestones: Vec<u32>,
    pub gammas: Vec<f64>,
    /// Floor of the cosine schedule
    pub eta_min: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { kind: ScheduleKind::Milestone, milestones: vec![50, 100], gammas: vec![0.1, 0.1], eta_min: 0.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub root: PathBuf,
    /// Extra log destination next to stderr
    pub log_file: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self { root: PathBuf::from("networks"), log_file: None, log_format: LogFormat::default() }
    }
}

impl ExperimentConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> TrainingResult<Self> {
        if !path.exists() {
            return Err(TrainingError::Configuration(format!("configuration file not found: {}", path.display())));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> TrainingResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would fail once training started.
    pub fn validate(&self) -> TrainingResult<()> {
        self.descriptor()?;
        if self.training.epochs == 0 {
            return Err(TrainingError::Configuration("training.epochs must be >= 1".to_string()));
        }
        if self.training.batch_size == 0 {
            return Err(TrainingError::Configuration("training.batch_size must be >= 1".to_string()));
        }
        self.build_optimizer()?;
        self.build_schedule()?;
        Ok(())
    }

    pub fn descriptor(&self) -> TrainingResult<CorpusDescriptor> {
        CorpusDescriptor::builtin(&self.experiment.corpus)
    }

    #[must_use]
    pub fn run(&self) -> RunKind {
        self.experiment.run
    }

    /// Loads and partitions the configured corpus with `partition_seed`.
    pub fn build_partitions(&self, loader: &dyn SampleLoader) -> TrainingResult<CorpusPartitions> {
        CorpusPartitions::build(self.descriptor()?, loader, self.experiment.partition_seed)
    }

    /// Loaders of the role the configured run trains on.
    pub fn loader_set(&self, partitions: &CorpusPartitions) -> TrainingResult<LoaderSet> {
        LoaderSet::for_role(partitions, self.run().data_role(), &self.loader_options())
    }

    pub fn build_schedule(&self) -> TrainingResult<Box<dyn LrSchedule>> {
        let base = vec![self.training.learning_rate];
        Ok(match self.schedule.kind {
            ScheduleKind::Milestone => Box::new(MilestoneSchedule::new(
                base,
                self.schedule.milestones.clone(),
                self.schedule.gammas.clone(),
            )?),
            ScheduleKind::Cosine => Box::new(CosineSchedule::new(base, self.training.epochs, self.schedule.eta_min)?),
        })
    }

    pub fn build_optimizer(&self) -> TrainingResult<Sgd> {
        Sgd::new(self.training.learning_rate, self.training.momentum, self.training.weight_decay)
    }

    #[must_use]
    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            batch_size: self.training.batch_size,
            seed: self.training.loader_seed,
            ..LoaderOptions::default()
        }
    }

    #[must_use]
    pub fn layout(&self) -> TrainingLayout {
        TrainingLayout::new(self.output.root.clone())
    }

    #[must_use]
    pub fn run_context(&self) -> RunContext {
        RunContext::new(self.experiment.run, self.experiment.seed, self.layout())
    }
}
