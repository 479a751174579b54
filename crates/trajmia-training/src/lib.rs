//! Trajmia Training
//!
//! Reproducible data partitioning and trajectory-recording training for
//! trajectory-based membership inference experiments:
//! - Partitioning a corpus into disjoint role blocks (`Partition`)
//! - Resolving role-scoped datasets and loaders (`DatasetRegistry`, `LoaderSet`)
//! - Learning-rate schedules (`MilestoneSchedule`, `CosineSchedule`)
//! - Training and distillation loops that persist a per-epoch `Trajectory`

pub mod checkpoint;
pub mod config;
pub mod corpus;
pub mod distill;
pub mod error;
pub mod layout;
pub mod loader;
pub mod loss;
pub mod metrics;
pub mod optim;
pub mod partition;
pub mod progress;
pub mod registry;
pub mod role;
pub mod schedule;
pub mod telemetry;
pub mod trainer;
pub mod trajectory;

pub use checkpoint::{
    latest_checkpoint, load_checkpoint, load_metric_history, ArtifactKind, Checkpoint, CheckpointSink,
    FsCheckpointSink, MetricHistory, PersistedArtifact,
};
pub use config::{ExperimentConfig, ScheduleConfig, ScheduleKind};
pub use corpus::{ConcatCorpus, CorpusDescriptor, DistillTestRule, SampleLoader};
pub use distill::{load_teacher, Distiller};
pub use error::{TrainingError, TrainingResult};
pub use layout::TrainingLayout;
pub use loader::{DataLoader, LoaderOptions, LoaderSet, RoleLoaders};
pub use loss::{cross_entropy, kl_div_batchmean, log_softmax, softmax, LossOutput};
pub use metrics::{top_k_correct, TopKAccuracy, TopKMeter};
pub use optim::Sgd;
pub use partition::{partition, Partition, PARTITION_SEED};
pub use progress::{ProgressEvent, ProgressSink, TracingProgressSink};
pub use registry::{CorpusPartitions, DatasetRegistry, RoleDataset};
pub use role::{Role, RunKind, Split, View};
pub use schedule::{round_rate, CosineSchedule, LrSchedule, MilestoneSchedule};
pub use telemetry::{init_tracing, open_log_file, LogFormat};
pub use trainer::{RunContext, Trainer};
pub use trajectory::{EpochRecord, Trajectory};
