//! Knowledge distillation against a frozen model.
//!
//! The student is trained on the distill role's loaders to match the
//! teacher's output distribution (batch-mean KL divergence). The view is
//! chosen by the teacher's augmentation requirement, and a checkpoint is
//! persisted after every epoch.

use crate::checkpoint::{load_checkpoint, Checkpoint};
use crate::error::{TrainingError, TrainingResult};
use crate::layout::TrainingLayout;
use crate::loader::LoaderSet;
use crate::loss::{kl_div_batchmean, LossOutput};
use crate::role::RunKind;
use crate::schedule::LrSchedule;
use crate::trainer::{run_epochs, BatchObjective, CheckpointPolicy, RunContext};
use crate::trajectory::Trajectory;
use ndarray::ArrayView2;
use trajmia_abstraction::{Classifier, ModelError, Mode, Optimizer};

struct TeacherObjective<'a> {
    teacher: &'a mut dyn Classifier,
}

impl BatchObjective for TeacherObjective<'_> {
    fn loss(
        &mut self,
        inputs: ArrayView2<'_, f32>,
        _labels: &[usize],
        logits: ArrayView2<'_, f32>,
    ) -> Result<LossOutput, ModelError> {
        let teacher_logits = self.teacher.forward(inputs)?;
        kl_div_batchmean(logits, teacher_logits.view())
    }

    fn augmented_input(&self, _student: &dyn Classifier) -> bool {
        self.teacher.requires_augmented_input()
    }
}

#[derive(Debug, Clone)]
pub struct Distiller {
    ctx: RunContext,
}

impl Distiller {
    pub fn new(ctx: RunContext) -> TrainingResult<Self> {
        if !ctx.run.is_distillation() {
            return Err(TrainingError::Configuration(format!("{} is not a distillation run", ctx.run)));
        }
        Ok(Self { ctx })
    }

    #[must_use]
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Distills `teacher` into `student` until `epochs` epochs have
    /// completed. The teacher is frozen and left in evaluation mode.
    pub fn distill(
        &self,
        teacher: &mut dyn Classifier,
        student: &mut dyn Classifier,
        loaders: &LoaderSet,
        epochs: u32,
        optimizer: &mut dyn Optimizer,
        schedule: &mut dyn LrSchedule,
    ) -> TrainingResult<Trajectory> {
        self.run(teacher, student, loaders, epochs, optimizer, schedule, Trajectory::new())
    }

    /// Continues a distillation run from `checkpoint` up to `epochs`
    /// epochs.
    pub fn resume(
        &self,
        teacher: &mut dyn Classifier,
        student: &mut dyn Classifier,
        loaders: &LoaderSet,
        epochs: u32,
        optimizer: &mut dyn Optimizer,
        schedule: &mut dyn LrSchedule,
        checkpoint: &Checkpoint,
    ) -> TrainingResult<Trajectory> {
        checkpoint.validate_for(self.ctx.run)?;
        checkpoint.restore_into(student)?;
        schedule.seek(checkpoint.epoch);
        tracing::info!(run = %self.ctx.run, epoch = checkpoint.epoch, "resuming distillation from checkpoint");
        self.run(teacher, student, loaders, epochs, optimizer, schedule, checkpoint.trajectory.clone())
    }

    fn run(
        &self,
        teacher: &mut dyn Classifier,
        student: &mut dyn Classifier,
        loaders: &LoaderSet,
        epochs: u32,
        optimizer: &mut dyn Optimizer,
        schedule: &mut dyn LrSchedule,
        trajectory: Trajectory,
    ) -> TrainingResult<Trajectory> {
        if !student.accepts_gradients() {
            return Err(TrainingError::Configuration("student has no trainable parameters".to_string()));
        }
        teacher.freeze();
        teacher.set_mode(Mode::Eval);

        let mut objective = TeacherObjective { teacher };
        run_epochs(
            &self.ctx,
            student,
            &mut objective,
            loaders,
            epochs,
            optimizer,
            schedule,
            trajectory,
            CheckpointPolicy::EveryEpoch,
        )
    }
}

/// Loads the final checkpoint of the model `run` distills from into
/// `teacher` and freezes it.
pub fn load_teacher(
    teacher: &mut dyn Classifier,
    layout: &TrainingLayout,
    teacher_seed: u64,
    run: RunKind,
) -> TrainingResult<Checkpoint> {
    let Some(teacher_run) = run.teacher_role().and_then(RunKind::direct) else {
        return Err(TrainingError::Configuration(format!("{run} run has no teacher")));
    };
    let Some(path) = layout.teacher_checkpoint_path(teacher_seed, run) else {
        return Err(TrainingError::Configuration(format!("{run} run has no teacher")));
    };

    let checkpoint = load_checkpoint(&path)?;
    if checkpoint.run != teacher_run {
        return Err(TrainingError::Checkpoint(format!(
            "{} holds a {} model, expected {teacher_run}",
            path.display(),
            checkpoint.run
        )));
    }
    checkpoint.restore_into(teacher)?;
    teacher.freeze();
    tracing::info!(%run, teacher = %teacher_run, epoch = checkpoint.epoch, path = %path.display(), "teacher loaded");
    Ok(checkpoint)
}
