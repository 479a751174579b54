//! Collaborator abstractions for trajectory training.
//!
//! This crate defines the narrow traits the training core consumes
//! (classifiers, optimizers, indexable corpus views) and the plain data
//! types passed across them. Concrete architectures and image pipelines
//! live outside the workspace and plug in through these traits.

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an error raised by a model, optimizer or sample collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// A sample could not be read or decoded.
    #[error("Sample Error: {0}")]
    SampleUnavailable(String),

    /// The forward pass failed.
    #[error("Forward Error: {0}")]
    Forward(String),

    /// Gradient propagation failed.
    #[error("Backward Error: {0}")]
    Backward(String),

    /// Input or parameter shapes did not line up.
    #[error("Shape Error: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// The shape the collaborator expected.
        expected: String,
        /// The shape it received.
        actual: String,
    },

    /// A parameter update or restore was rejected.
    #[error("Parameter Error: {0}")]
    Parameter(String),

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

/// A decoded sample and its class label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    /// Flattened, preprocessed features.
    pub features: Vec<f32>,
    /// Class index in `0..num_classes`.
    pub label: usize,
}

/// An ordered, fixed-size, randomly indexable collection of samples.
///
/// Implementations may apply stochastic preprocessing in `get` (the
/// augmented view) but must keep index-to-sample identity stable.
pub trait CorpusView: Send + Sync {
    /// Number of samples in the view.
    fn len(&self) -> usize;

    /// Whether the view holds no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the sample at `index`.
    ///
    /// # Errors
    /// Returns `ModelError::SampleUnavailable` if the sample cannot be read.
    fn get(&self, index: usize) -> Result<LabeledSample, ModelError>;
}

/// A corpus view over samples that are already decoded in memory.
#[derive(Debug, Clone, Default)]
pub struct VecCorpus {
    samples: Vec<LabeledSample>,
}

impl VecCorpus {
    #[must_use]
    pub fn new(samples: Vec<LabeledSample>) -> Self {
        Self { samples }
    }

    /// Builds a corpus from parallel feature rows and labels.
    pub fn from_parts(features: Vec<Vec<f32>>, labels: Vec<usize>) -> Result<Self, ModelError> {
        if features.len() != labels.len() {
            return Err(ModelError::ShapeMismatch {
                expected: format!("{} labels", features.len()),
                actual: format!("{} labels", labels.len()),
            });
        }
        let samples = features
            .into_iter()
            .zip(labels)
            .map(|(features, label)| LabeledSample { features, label })
            .collect();
        Ok(Self { samples })
    }
}

impl CorpusView for VecCorpus {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<LabeledSample, ModelError> {
        self.samples.get(index).cloned().ok_or_else(|| {
            ModelError::SampleUnavailable(format!(
                "index {index} out of range for corpus of {} samples",
                self.samples.len()
            ))
        })
    }
}

/// A mini-batch handed to a classifier.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    /// One row per example.
    pub inputs: Array2<f32>,
    /// Ground-truth labels, parallel to the rows of `inputs`.
    pub labels: Vec<usize>,
    /// Stable pre-partition indices, parallel to the rows of `inputs`.
    pub indices: Vec<usize>,
}

impl SampleBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Training vs evaluation behaviour of a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Train,
    Eval,
}

/// A named, flat parameter tensor with its accumulated gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Array1<f32>,
    pub grad: Array1<f32>,
    /// Whether optimizers may update this parameter.
    pub requires_grad: bool,
}

impl Parameter {
    #[must_use]
    pub fn new(name: impl Into<String>, value: Array1<f32>) -> Self {
        let grad = Array1::zeros(value.len());
        Self { name: name.into(), value, grad, requires_grad: true }
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    #[must_use]
    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot { name: self.name.clone(), values: self.value.to_vec() }
    }

    /// Overwrites the value from a snapshot with the same name and length.
    pub fn restore(&mut self, snapshot: &ParameterSnapshot) -> Result<(), ModelError> {
        if snapshot.name != self.name {
            return Err(ModelError::Parameter(format!(
                "snapshot '{}' does not match parameter '{}'",
                snapshot.name, self.name
            )));
        }
        if snapshot.values.len() != self.value.len() {
            return Err(ModelError::ShapeMismatch {
                expected: format!("{} values for '{}'", self.value.len(), self.name),
                actual: format!("{} values", snapshot.values.len()),
            });
        }
        self.value = Array1::from(snapshot.values.clone());
        Ok(())
    }
}

/// Serializable copy of a parameter's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    pub name: String,
    pub values: Vec<f32>,
}

/// A classifier producing one row of class scores (logits) per input row.
///
/// Whether an instance can be trained is a capability of its parameters
/// (`requires_grad`), not of its type: the same implementation serves as a
/// frozen distillation teacher and as a trainable student.
pub trait Classifier: Send {
    /// Computes logits of shape `(batch, num_classes)`.
    ///
    /// # Errors
    /// Returns a `ModelError` if the forward pass fails.
    fn forward(&mut self, inputs: ArrayView2<'_, f32>) -> Result<Array2<f32>, ModelError>;

    /// Accumulates parameter gradients given the loss gradient with
    /// respect to the logits of the most recent `forward` call.
    ///
    /// # Errors
    /// Returns a `ModelError` if no forward activations are cached or the
    /// gradient shape is wrong.
    fn backward(&mut self, grad_logits: ArrayView2<'_, f32>) -> Result<(), ModelError>;

    fn parameters(&self) -> &[Parameter];

    fn parameters_mut(&mut self) -> &mut [Parameter];

    fn set_mode(&mut self, mode: Mode);

    /// Whether training should feed this model the augmented view.
    fn requires_augmented_input(&self) -> bool {
        true
    }

    /// Whether any parameter accepts gradient updates.
    fn accepts_gradients(&self) -> bool {
        self.parameters().iter().any(|p| p.requires_grad)
    }

    /// Marks every parameter as not accepting gradient updates.
    fn freeze(&mut self) {
        for param in self.parameters_mut() {
            param.requires_grad = false;
        }
    }

    fn snapshot(&self) -> Vec<ParameterSnapshot> {
        self.parameters().iter().map(Parameter::snapshot).collect()
    }

    /// Loads parameter values previously taken with `snapshot`.
    ///
    /// # Errors
    /// Returns a `ModelError` if the snapshot does not match the parameter
    /// list by count, name or length.
    fn restore(&mut self, snapshots: &[ParameterSnapshot]) -> Result<(), ModelError> {
        let params = self.parameters_mut();
        if params.len() != snapshots.len() {
            return Err(ModelError::ShapeMismatch {
                expected: format!("{} parameters", params.len()),
                actual: format!("{} parameters", snapshots.len()),
            });
        }
        for (param, snapshot) in params.iter_mut().zip(snapshots) {
            param.restore(snapshot)?;
        }
        Ok(())
    }
}

/// A gradient-based parameter update rule.
pub trait Optimizer: Send {
    /// Current learning rate of every parameter group.
    fn learning_rates(&self) -> Vec<f64>;

    /// Replaces the learning rate of every parameter group.
    ///
    /// # Errors
    /// Returns `ModelError::Parameter` if the number of rates does not match
    /// the number of groups.
    fn set_learning_rates(&mut self, rates: &[f64]) -> Result<(), ModelError>;

    fn zero_grad(&mut self, params: &mut [Parameter]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Applies one update from the accumulated gradients.
    ///
    /// # Errors
    /// Returns a `ModelError` if the parameter list changed shape between
    /// steps.
    fn step(&mut self, params: &mut [Parameter]) -> Result<(), ModelError>;
}
