//! Top-k accuracy.
//!
//! Classes are ranked by descending score with ties going to the lower
//! class index. An example counts as correct at `k` when its label ranks
//! among the first `k`.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use trajmia_abstraction::ModelError;

/// Number of examples whose label ranks within the top `k`, for each `k`.
pub fn top_k_correct(logits: ArrayView2<'_, f32>, labels: &[usize], ks: &[usize]) -> Result<Vec<usize>, ModelError> {
    let (rows, classes) = logits.dim();
    if labels.len() != rows {
        return Err(ModelError::ShapeMismatch {
            expected: format!("{rows} labels"),
            actual: format!("{} labels", labels.len()),
        });
    }

    let mut correct = vec![0usize; ks.len()];
    for (row, &label) in logits.rows().into_iter().zip(labels) {
        if label >= classes {
            return Err(ModelError::ShapeMismatch {
                expected: format!("label < {classes}"),
                actual: format!("label {label}"),
            });
        }
        let score = row[label];
        let rank = row
            .iter()
            .enumerate()
            .filter(|&(class, &other)| other > score || (other == score && class < label))
            .count();
        for (hits, &k) in correct.iter_mut().zip(ks) {
            if rank < k {
                *hits += 1;
            }
        }
    }
    Ok(correct)
}

/// Running top-k accuracy over many batches, weighted by batch size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopKMeter {
    ks: Vec<usize>,
    correct: Vec<usize>,
    count: usize,
}

impl TopKMeter {
    #[must_use]
    pub fn new(ks: &[usize]) -> Self {
        Self { ks: ks.to_vec(), correct: vec![0; ks.len()], count: 0 }
    }

    pub fn update(&mut self, logits: ArrayView2<'_, f32>, labels: &[usize]) -> Result<(), ModelError> {
        let batch = top_k_correct(logits, labels, &self.ks)?;
        for (total, hits) in self.correct.iter_mut().zip(batch) {
            *total += hits;
        }
        self.count += labels.len();
        Ok(())
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Percentages, one per `k`; all zero before any update.
    #[must_use]
    pub fn averages(&self) -> Vec<f64> {
        self.correct
            .iter()
            .map(|&hits| if self.count == 0 { 0.0 } else { hits as f64 * 100.0 / self.count as f64 })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopKAccuracy {
    pub top1: f64,
    pub top5: f64,
}

impl TopKAccuracy {
    pub(crate) const KS: [usize; 2] = [1, 5];

    pub(crate) fn from_meter(meter: &TopKMeter) -> Self {
        let averages = meter.averages();
        Self { top1: averages[0], top5: averages[1] }
    }
}
