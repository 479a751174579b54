use crate::role::RunKind;
use thiserror::Error;
use trajmia_abstraction::ModelError;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("partition sizes sum to {actual} but the corpus holds {expected} samples")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("invalid learning-rate schedule: {0}")]
    InvalidSchedule(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("cannot read corpus '{corpus}'{}: {source}", index_suffix(.index))]
    DataAccess {
        corpus: String,
        index: Option<usize>,
        #[source]
        source: ModelError,
    },

    #[error("numerical failure in {run} run at epoch {epoch}{}: {detail}", batch_suffix(.batch))]
    Numerical { run: RunKind, epoch: u32, batch: Option<usize>, detail: String },

    #[error("{run} run failed at epoch {epoch}{}: {source}", batch_suffix(.batch))]
    Model {
        run: RunKind,
        epoch: u32,
        batch: Option<usize>,
        #[source]
        source: ModelError,
    },

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrainingError {
    /// Whether the error was raised while validating inputs, before any
    /// training started.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::SizeMismatch { .. } | Self::InvalidSchedule(_) | Self::Configuration(_))
    }
}

fn index_suffix(index: &Option<usize>) -> String {
    index.map(|i| format!(" at sample {i}")).unwrap_or_default()
}

fn batch_suffix(batch: &Option<usize>) -> String {
    batch.map(|b| format!(", batch {b}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numerical_error_names_run_epoch_and_batch() {
        let err = TrainingError::Numerical {
            run: RunKind::Shadow,
            epoch: 3,
            batch: Some(7),
            detail: "loss is NaN".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("shadow"));
        assert!(msg.contains("epoch 3"));
        assert!(msg.contains("batch 7"));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_data_access_error_without_index() {
        let err = TrainingError::DataAccess {
            corpus: "cifar10".to_string(),
            index: None,
            source: ModelError::SampleUnavailable("missing shard".to_string()),
        };
        assert_eq!(err.to_string(), "cannot read corpus 'cifar10': Sample Error: missing shard");
    }

    #[test]
    fn test_configuration_classification() {
        assert!(TrainingError::SizeMismatch { expected: 10, actual: 9 }.is_configuration());
        assert!(TrainingError::InvalidSchedule("x".to_string()).is_configuration());
        assert!(!TrainingError::Checkpoint("x".to_string()).is_configuration());
    }

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let err: TrainingError = anyhow::anyhow!("sink offline").context("persisting epoch 2").into();
        assert!(matches!(err, TrainingError::Other(_)));
        assert_eq!(err.to_string(), "persisting epoch 2");
    }
}
