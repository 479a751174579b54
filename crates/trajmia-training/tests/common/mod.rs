//! Shared test utilities for trajmia-training integration tests.
//!
//! Provides a small linear classifier, an in-memory sample loader for a
//! 28-sample toy corpus, and recording sinks.

#![allow(dead_code)]

use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use trajmia_abstraction::{Classifier, CorpusView, ModelError, Mode, Parameter, VecCorpus};
use trajmia_training::{
    Checkpoint, CheckpointSink, CorpusDescriptor, CorpusPartitions, DistillTestRule, FsCheckpointSink, MetricHistory,
    PersistedArtifact, ProgressEvent, ProgressSink, SampleLoader, TrainingResult, View, PARTITION_SEED,
};

pub const FEATURES: usize = 4;
pub const CLASSES: usize = 3;

/// Added to every feature of the augmented view.
pub const AUGMENT_SHIFT: f32 = 0.5;

/// Toy corpus: a 20-sample train shard and an 8-sample test shard split
/// `[4, 4, 4, 4, 8, 4]` with an independent distill-test block.
pub fn toy_descriptor() -> CorpusDescriptor {
    CorpusDescriptor::new("toy", &["train", "test"], vec![4, 4, 4, 4, 8, 4], DistillTestRule::Independent, CLASSES)
}

/// Sample `i` of the concatenated toy corpus.
pub fn toy_sample(i: usize) -> (Vec<f32>, usize) {
    let label = i % CLASSES;
    let mut features = vec![i as f32 * 0.001; FEATURES];
    features[label] += 1.0;
    (features, label)
}

pub struct ToyLoader;

impl SampleLoader for ToyLoader {
    fn load_shard(&self, corpus: &str, shard: &str, view: View) -> Result<Arc<dyn CorpusView>, ModelError> {
        let range = match (corpus, shard) {
            ("toy", "train") => 0..20,
            ("toy", "test") => 20..28,
            _ => return Err(ModelError::SampleUnavailable(format!("no shard {corpus}/{shard}"))),
        };
        let shift = if view.is_augmented() { AUGMENT_SHIFT } else { 0.0 };
        let (features, labels): (Vec<Vec<f32>>, Vec<usize>) = range
            .map(|i| {
                let (features, label) = toy_sample(i);
                (features.into_iter().map(|v| v + shift).collect(), label)
            })
            .unzip();
        Ok(Arc::new(VecCorpus::from_parts(features, labels)?))
    }
}

pub fn toy_partitions() -> CorpusPartitions {
    CorpusPartitions::build(toy_descriptor(), &ToyLoader, PARTITION_SEED).unwrap()
}

/// `logits = x · Wᵀ + b` with deterministic initial weights.
pub struct LinearClassifier {
    params: Vec<Parameter>,
    inputs: Option<Array2<f32>>,
    mode: Mode,
    augmented: bool,
    emit_nan: bool,
    /// Largest input value seen by a forward pass in training mode.
    pub max_train_input: f32,
}

impl LinearClassifier {
    pub fn new() -> Self {
        let weights = Array1::from_iter((0..CLASSES * FEATURES).map(|i| ((i * 7) % 5) as f32 * 0.02 - 0.04));
        Self {
            params: vec![Parameter::new("weight", weights), Parameter::new("bias", Array1::zeros(CLASSES))],
            inputs: None,
            mode: Mode::Train,
            augmented: true,
            emit_nan: false,
            max_train_input: f32::NEG_INFINITY,
        }
    }

    pub fn canonical_input(mut self) -> Self {
        self.augmented = false;
        self
    }

    pub fn emitting_nan(mut self) -> Self {
        self.emit_nan = true;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn weight_matrix(&self) -> Result<Array2<f32>, ModelError> {
        Array2::from_shape_vec((CLASSES, FEATURES), self.params[0].value.to_vec())
            .map_err(|e| ModelError::ShapeMismatch { expected: format!("{CLASSES}x{FEATURES}"), actual: e.to_string() })
    }
}

impl Classifier for LinearClassifier {
    fn forward(&mut self, inputs: ArrayView2<'_, f32>) -> Result<Array2<f32>, ModelError> {
        if inputs.ncols() != FEATURES {
            return Err(ModelError::ShapeMismatch {
                expected: format!("{FEATURES} features"),
                actual: format!("{} features", inputs.ncols()),
            });
        }
        if self.mode == Mode::Train {
            self.max_train_input = inputs.iter().copied().fold(self.max_train_input, f32::max);
        }
        let mut logits = inputs.dot(&self.weight_matrix()?.t()) + &self.params[1].value;
        if self.emit_nan {
            logits.fill(f32::NAN);
        }
        self.inputs = Some(inputs.to_owned());
        Ok(logits)
    }

    fn backward(&mut self, grad_logits: ArrayView2<'_, f32>) -> Result<(), ModelError> {
        let inputs = self.inputs.as_ref().ok_or_else(|| ModelError::Backward("no cached forward pass".to_string()))?;
        let grad_weight = grad_logits.t().dot(inputs);
        let grad_bias = grad_logits.sum_axis(Axis(0));
        self.params[0].grad += &Array1::from_iter(grad_weight.iter().copied());
        self.params[1].grad += &grad_bias;
        Ok(())
    }

    fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn requires_augmented_input(&self) -> bool {
        self.augmented
    }
}

/// Writes through to the filesystem and remembers what was persisted.
#[derive(Default)]
pub struct RecordingSink {
    pub checkpoints: Mutex<Vec<(PathBuf, u32)>>,
    pub trajectory_epochs: Mutex<Vec<u32>>,
}

impl CheckpointSink for RecordingSink {
    fn persist_checkpoint(&self, checkpoint: &Checkpoint, dest: &Path) -> TrainingResult<PersistedArtifact> {
        self.checkpoints.lock().unwrap().push((dest.to_path_buf(), checkpoint.epoch));
        FsCheckpointSink.persist_checkpoint(checkpoint, dest)
    }

    fn persist_trajectory(&self, history: &MetricHistory, dest: &Path) -> TrainingResult<PersistedArtifact> {
        self.trajectory_epochs.lock().unwrap().push(history.trajectory.last_epoch());
        FsCheckpointSink.persist_trajectory(history, dest)
    }
}

impl RecordingSink {
    pub fn checkpoint_epochs(&self) -> Vec<u32> {
        self.checkpoints.lock().unwrap().iter().map(|(_, epoch)| *epoch).collect()
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingProgress {
    fn on_event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
