//! Trajectory-recording training loop.
//!
//! Each epoch trains on the role's train loader, evaluates top-1/top-5 on
//! the test loader then the train loader, appends one trajectory record
//! and persists the metric history before the next epoch starts.

use crate::checkpoint::{Checkpoint, CheckpointSink, FsCheckpointSink, MetricHistory};
use crate::error::{TrainingError, TrainingResult};
use crate::layout::TrainingLayout;
use crate::loader::{DataLoader, LoaderSet};
use crate::loss::{cross_entropy, LossOutput};
use crate::metrics::{TopKAccuracy, TopKMeter};
use crate::progress::{ProgressEvent, ProgressSink, TracingProgressSink};
use crate::role::RunKind;
use crate::schedule::LrSchedule;
use crate::trajectory::{EpochRecord, Trajectory};
use ndarray::{Array2, ArrayView2};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use trajmia_abstraction::{Classifier, ModelError, Mode, Optimizer};

/// Identity and outputs of one run.
#[derive(Clone)]
pub struct RunContext {
    pub run: RunKind,
    pub seed: u64,
    pub layout: TrainingLayout,
    pub sink: Arc<dyn CheckpointSink>,
    pub progress: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run", &self.run)
            .field("seed", &self.seed)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl RunContext {
    /// Context writing JSON files under `layout` and reporting through
    /// `tracing`.
    #[must_use]
    pub fn new(run: RunKind, seed: u64, layout: TrainingLayout) -> Self {
        Self {
            run,
            seed,
            layout,
            sink: Arc::new(FsCheckpointSink),
            progress: Arc::new(TracingProgressSink),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn CheckpointSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Top-1/top-5 accuracy of `model` over every batch of `loader`.
    ///
    /// The model is put in evaluation mode and no gradient is computed.
    pub fn evaluate(&self, model: &mut dyn Classifier, loader: &DataLoader, epoch: u32) -> TrainingResult<TopKAccuracy> {
        model.set_mode(Mode::Eval);
        let mut meter = TopKMeter::new(&TopKAccuracy::KS);
        for (index, batch) in loader.batches(epoch).enumerate() {
            let batch = batch?;
            let logits = model.forward(batch.inputs.view()).map_err(self.model_error(epoch, Some(index)))?;
            self.check_finite(&logits, epoch, Some(index))?;
            meter.update(logits.view(), &batch.labels).map_err(self.model_error(epoch, Some(index)))?;
        }
        Ok(TopKAccuracy::from_meter(&meter))
    }

    fn model_error(&self, epoch: u32, batch: Option<usize>) -> impl FnOnce(ModelError) -> TrainingError {
        let run = self.run;
        move |source| TrainingError::Model { run, epoch, batch, source }
    }

    fn check_finite(&self, logits: &Array2<f32>, epoch: u32, batch: Option<usize>) -> TrainingResult<()> {
        if logits.iter().all(|v| v.is_finite()) {
            return Ok(());
        }
        Err(TrainingError::Numerical { run: self.run, epoch, batch, detail: "non-finite logits".to_string() })
    }

    fn persist_history(&self, trajectory: &Trajectory) -> TrainingResult<()> {
        let history = MetricHistory::new(self.run, self.seed, trajectory);
        self.sink.persist_trajectory(&history, &self.layout.trajectory_path(self.seed, self.run))?;
        Ok(())
    }

    fn persist_checkpoint(&self, model: &dyn Classifier, trajectory: &Trajectory, dest: &Path) -> TrainingResult<()> {
        let checkpoint = Checkpoint::capture(self.run, self.seed, model, trajectory);
        let artifact = self.sink.persist_checkpoint(&checkpoint, dest)?;
        tracing::debug!(run = %self.run, epoch = checkpoint.epoch, sha256 = %artifact.sha256, "checkpoint persisted");
        self.progress.on_event(ProgressEvent::CheckpointWritten {
            run: self.run,
            epoch: checkpoint.epoch,
            path: artifact.path,
        });
        Ok(())
    }
}

/// Per-batch loss of the training pass, given the model's logits.
pub(crate) trait BatchObjective {
    fn loss(
        &mut self,
        inputs: ArrayView2<'_, f32>,
        labels: &[usize],
        logits: ArrayView2<'_, f32>,
    ) -> Result<LossOutput, ModelError>;

    /// Whether the epoch feeds the augmented view to `model`.
    fn augmented_input(&self, model: &dyn Classifier) -> bool {
        model.requires_augmented_input()
    }
}

struct LabelObjective;

impl BatchObjective for LabelObjective {
    fn loss(
        &mut self,
        _inputs: ArrayView2<'_, f32>,
        labels: &[usize],
        logits: ArrayView2<'_, f32>,
    ) -> Result<LossOutput, ModelError> {
        cross_entropy(logits, labels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CheckpointPolicy {
    EveryEpoch,
    Final,
}

/// Runs epochs `trajectory.last_epoch() + 1 ..= epochs`.
pub(crate) fn run_epochs(
    ctx: &RunContext,
    model: &mut dyn Classifier,
    objective: &mut dyn BatchObjective,
    loaders: &LoaderSet,
    epochs: u32,
    optimizer: &mut dyn Optimizer,
    schedule: &mut dyn LrSchedule,
    mut trajectory: Trajectory,
    policy: CheckpointPolicy,
) -> TrainingResult<Trajectory> {
    let run = ctx.run;
    if loaders.role() != run.data_role() {
        return Err(TrainingError::Configuration(format!(
            "{run} run needs {} loaders, got {}",
            run.data_role(),
            loaders.role()
        )));
    }
    if schedule.last_epoch() != trajectory.last_epoch() {
        return Err(TrainingError::Configuration(format!(
            "schedule is at epoch {} but the trajectory ends at epoch {}",
            schedule.last_epoch(),
            trajectory.last_epoch()
        )));
    }
    if trajectory.last_epoch() > epochs {
        return Err(TrainingError::Configuration(format!(
            "trajectory already holds {} epochs, more than the requested {epochs}",
            trajectory.last_epoch()
        )));
    }

    let first_epoch = schedule.next_epoch();
    ctx.progress.on_event(ProgressEvent::RunStarted { run, seed: ctx.seed, first_epoch, last_epoch: epochs });

    for epoch in first_epoch..=epochs {
        let rates = schedule.current_rates();
        optimizer.set_learning_rates(&rates).map_err(ctx.model_error(epoch, None))?;
        let learning_rate = rates.last().copied().unwrap_or_default();

        let pair = loaders.select(objective.augmented_input(&*model))?;
        ctx.progress.on_event(ProgressEvent::EpochStarted { run, epoch, learning_rate });

        let started = Instant::now();
        model.set_mode(Mode::Train);
        for (index, batch) in pair.train.batches(epoch).enumerate() {
            let batch = batch?;
            let wrap = |source| TrainingError::Model { run, epoch, batch: Some(index), source };

            optimizer.zero_grad(model.parameters_mut());
            let logits = model.forward(batch.inputs.view()).map_err(wrap)?;
            ctx.check_finite(&logits, epoch, Some(index))?;
            let LossOutput { loss, grad } =
                objective.loss(batch.inputs.view(), &batch.labels, logits.view()).map_err(wrap)?;
            if !loss.is_finite() {
                return Err(TrainingError::Numerical {
                    run,
                    epoch,
                    batch: Some(index),
                    detail: format!("loss is {loss}"),
                });
            }
            if !grad.iter().all(|g| g.is_finite()) {
                return Err(TrainingError::Numerical {
                    run,
                    epoch,
                    batch: Some(index),
                    detail: "non-finite loss gradient".to_string(),
                });
            }
            model.backward(grad.view()).map_err(wrap)?;
            optimizer.step(model.parameters_mut()).map_err(wrap)?;
        }
        let epoch_time_secs = started.elapsed().as_secs_f64();

        let test = ctx.evaluate(model, &pair.test, epoch)?;
        let train = ctx.evaluate(model, &pair.train, epoch)?;
        trajectory.push(EpochRecord::new(epoch, epoch_time_secs, train, test, learning_rate))?;
        ctx.persist_history(&trajectory)?;
        if policy == CheckpointPolicy::EveryEpoch {
            ctx.persist_checkpoint(model, &trajectory, &ctx.layout.epoch_checkpoint_path(ctx.seed, run, epoch))?;
        }

        tracing::info!(
            run = %run,
            epoch,
            lr = learning_rate,
            secs = epoch_time_secs,
            train_top1 = train.top1,
            train_top5 = train.top5,
            test_top1 = test.top1,
            test_top5 = test.top5,
            "epoch complete"
        );
        ctx.progress.on_event(ProgressEvent::EpochFinished {
            run,
            epoch,
            epoch_time_secs,
            train_top1: train.top1,
            test_top1: test.top1,
        });
        schedule.step();
    }

    if policy == CheckpointPolicy::Final {
        ctx.persist_checkpoint(model, &trajectory, &ctx.layout.final_checkpoint_path(ctx.seed, run))?;
    }
    ctx.progress.on_event(ProgressEvent::RunFinished {
        run,
        epochs: trajectory.last_epoch(),
        total_time_secs: trajectory.total_time_secs(),
    });
    Ok(trajectory)
}

/// Supervised training of a target or shadow model.
///
/// The trajectory file is rewritten after every epoch and `final.json`
/// is written once the last epoch completes.
#[derive(Debug, Clone)]
pub struct Trainer {
    ctx: RunContext,
}

impl Trainer {
    pub fn new(ctx: RunContext) -> TrainingResult<Self> {
        if ctx.run.is_distillation() {
            return Err(TrainingError::Configuration(format!(
                "{} is a distillation run; use Distiller",
                ctx.run
            )));
        }
        Ok(Self { ctx })
    }

    #[must_use]
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Trains `model` until `epochs` epochs have completed.
    pub fn train(
        &self,
        model: &mut dyn Classifier,
        loaders: &LoaderSet,
        epochs: u32,
        optimizer: &mut dyn Optimizer,
        schedule: &mut dyn LrSchedule,
    ) -> TrainingResult<Trajectory> {
        run_epochs(
            &self.ctx,
            model,
            &mut LabelObjective,
            loaders,
            epochs,
            optimizer,
            schedule,
            Trajectory::new(),
            CheckpointPolicy::Final,
        )
    }

    /// Continues a run from `checkpoint` up to `epochs` epochs.
    pub fn resume(
        &self,
        model: &mut dyn Classifier,
        loaders: &LoaderSet,
        epochs: u32,
        optimizer: &mut dyn Optimizer,
        schedule: &mut dyn LrSchedule,
        checkpoint: &Checkpoint,
    ) -> TrainingResult<Trajectory> {
        checkpoint.validate_for(self.ctx.run)?;
        checkpoint.restore_into(model)?;
        schedule.seek(checkpoint.epoch);
        tracing::info!(run = %self.ctx.run, epoch = checkpoint.epoch, "resuming from checkpoint");
        run_epochs(
            &self.ctx,
            model,
            &mut LabelObjective,
            loaders,
            epochs,
            optimizer,
            schedule,
            checkpoint.trajectory.clone(),
            CheckpointPolicy::Final,
        )
    }
}
