//! Per-epoch performance trajectory of one model.

use crate::error::{TrainingError, TrainingResult};
use crate::metrics::TopKAccuracy;
use serde::{Deserialize, Serialize};

/// Metrics recorded at the end of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch number.
    pub epoch: u32,
    /// Wall-clock duration of the training pass, excluding evaluation.
    pub epoch_time_secs: f64,
    pub train_top1: f64,
    pub train_top5: f64,
    pub test_top1: f64,
    pub test_top5: f64,
    pub learning_rate: f64,
}

impl EpochRecord {
    #[must_use]
    pub fn new(epoch: u32, epoch_time_secs: f64, train: TopKAccuracy, test: TopKAccuracy, learning_rate: f64) -> Self {
        Self {
            epoch,
            epoch_time_secs,
            train_top1: train.top1,
            train_top5: train.top5,
            test_top1: test.top1,
            test_top5: test.top5,
            learning_rate,
        }
    }
}

/// Append-only sequence of epoch records with consecutive epoch numbers.
///
/// Serialized as a plain list; deserializing rejects gaps and repeats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<EpochRecord>", into = "Vec<EpochRecord>")]
pub struct Trajectory {
    records: Vec<EpochRecord>,
}

impl TryFrom<Vec<EpochRecord>> for Trajectory {
    type Error = TrainingError;

    fn try_from(records: Vec<EpochRecord>) -> TrainingResult<Self> {
        let mut trajectory = Self::new();
        for record in records {
            trajectory.push(record)?;
        }
        Ok(trajectory)
    }
}

impl From<Trajectory> for Vec<EpochRecord> {
    fn from(trajectory: Trajectory) -> Self {
        trajectory.records
    }
}

impl Trajectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `record`, which must directly follow the last epoch.
    pub fn push(&mut self, record: EpochRecord) -> TrainingResult<()> {
        let expected = self.last_epoch() + 1;
        if record.epoch != expected {
            return Err(TrainingError::Checkpoint(format!(
                "trajectory expects epoch {expected}, got {}",
                record.epoch
            )));
        }
        self.records.push(record);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    #[must_use]
    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    /// Epoch of the last record, or 0 when empty.
    #[must_use]
    pub fn last_epoch(&self) -> u32 {
        self.records.last().map_or(0, |r| r.epoch)
    }

    /// Sum of the recorded training-pass durations.
    #[must_use]
    pub fn total_time_secs(&self) -> f64 {
        self.records.iter().map(|r| r.epoch_time_secs).sum()
    }

    #[must_use]
    pub fn learning_rates(&self) -> Vec<f64> {
        self.column(|r| r.learning_rate)
    }

    #[must_use]
    pub fn train_top1(&self) -> Vec<f64> {
        self.column(|r| r.train_top1)
    }

    #[must_use]
    pub fn train_top5(&self) -> Vec<f64> {
        self.column(|r| r.train_top5)
    }

    #[must_use]
    pub fn test_top1(&self) -> Vec<f64> {
        self.column(|r| r.test_top1)
    }

    #[must_use]
    pub fn test_top5(&self) -> Vec<f64> {
        self.column(|r| r.test_top5)
    }

    fn column(&self, f: impl Fn(&EpochRecord) -> f64) -> Vec<f64> {
        self.records.iter().map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: u32, secs: f64) -> EpochRecord {
        let acc = TopKAccuracy { top1: 50.0, top5: 90.0 };
        EpochRecord::new(epoch, secs, acc, TopKAccuracy { top1: 40.0, top5: 80.0 }, 0.1)
    }

    #[test]
    fn test_push_requires_consecutive_epochs() {
        let mut trajectory = Trajectory::new();
        assert!(trajectory.push(record(2, 1.0)).is_err());
        trajectory.push(record(1, 1.0)).unwrap();
        trajectory.push(record(2, 1.5)).unwrap();
        assert!(trajectory.push(record(2, 1.0)).is_err());
        assert!(trajectory.push(record(4, 1.0)).is_err());
        assert_eq!(trajectory.len(), 2);
        assert_eq!(trajectory.last_epoch(), 2);
    }

    #[test]
    fn test_columns_and_total_time() {
        let mut trajectory = Trajectory::new();
        for epoch in 1..=3 {
            trajectory.push(record(epoch, 0.5)).unwrap();
        }
        assert_eq!(trajectory.total_time_secs(), 1.5);
        assert_eq!(trajectory.train_top1(), vec![50.0; 3]);
        assert_eq!(trajectory.test_top5(), vec![80.0; 3]);
        assert_eq!(trajectory.learning_rates(), vec![0.1; 3]);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let mut trajectory = Trajectory::new();
        trajectory.push(record(1, 2.0)).unwrap();
        let json = serde_json::to_value(&trajectory).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["epoch"], 1);
        assert_eq!(json[0]["test_top1"], 40.0);
        let back: Trajectory = serde_json::from_value(json).unwrap();
        assert_eq!(back, trajectory);
    }

    #[test]
    fn test_deserialize_rejects_epoch_gaps() {
        let gapped = serde_json::to_value(vec![record(1, 1.0), record(3, 1.0)]).unwrap();
        let err = serde_json::from_value::<Trajectory>(gapped).unwrap_err();
        assert!(err.to_string().contains("expects epoch 2"));

        let late_start = serde_json::to_value(vec![record(2, 1.0)]).unwrap();
        assert!(serde_json::from_value::<Trajectory>(late_start).is_err());
    }
}
