//! Batch losses over logits, returned together with their logit gradient.

use ndarray::{Array2, ArrayView2, Zip};
use trajmia_abstraction::ModelError;

/// Batch-mean loss and its gradient with respect to the input logits.
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub loss: f64,
    pub grad: Array2<f32>,
}

/// Row-wise log-softmax.
#[must_use]
pub fn log_softmax(logits: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut out = logits.to_owned();
    for mut row in out.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let log_sum = row.fold(0.0f32, |acc, &v| acc + (v - max).exp()).ln() + max;
        row.mapv_inplace(|v| v - log_sum);
    }
    out
}

/// Row-wise softmax.
#[must_use]
pub fn softmax(logits: ArrayView2<'_, f32>) -> Array2<f32> {
    log_softmax(logits).mapv_into(f32::exp)
}

/// Mean cross-entropy of `logits` against class labels.
pub fn cross_entropy(logits: ArrayView2<'_, f32>, labels: &[usize]) -> Result<LossOutput, ModelError> {
    let (rows, classes) = logits.dim();
    if labels.len() != rows {
        return Err(ModelError::ShapeMismatch {
            expected: format!("{rows} labels"),
            actual: format!("{} labels", labels.len()),
        });
    }
    if let Some(&label) = labels.iter().find(|&&label| label >= classes) {
        return Err(ModelError::ShapeMismatch {
            expected: format!("label < {classes}"),
            actual: format!("label {label}"),
        });
    }

    let log_probs = log_softmax(logits);
    let scale = 1.0 / rows.max(1) as f32;
    let loss = labels.iter().enumerate().map(|(row, &label)| -f64::from(log_probs[[row, label]])).sum::<f64>()
        / rows.max(1) as f64;

    let mut grad = log_probs.mapv_into(f32::exp);
    for (row, &label) in labels.iter().enumerate() {
        grad[[row, label]] -= 1.0;
    }
    grad.mapv_inplace(|g| g * scale);
    Ok(LossOutput { loss, grad })
}

/// Batch-mean KL divergence `KL(teacher || student)` on softmax outputs.
///
/// The gradient is taken with respect to the student logits only. Any
/// non-finite teacher logit makes the loss NaN.
pub fn kl_div_batchmean(
    student_logits: ArrayView2<'_, f32>,
    teacher_logits: ArrayView2<'_, f32>,
) -> Result<LossOutput, ModelError> {
    if student_logits.dim() != teacher_logits.dim() {
        return Err(ModelError::ShapeMismatch {
            expected: format!("{:?}", student_logits.dim()),
            actual: format!("{:?}", teacher_logits.dim()),
        });
    }
    let rows = student_logits.nrows().max(1);
    let student_log_probs = log_softmax(student_logits);
    let teacher_log_probs = log_softmax(teacher_logits);

    let mut total = 0.0f64;
    Zip::from(&teacher_log_probs).and(&student_log_probs).for_each(|&t, &s| {
        let p = t.exp();
        if p > 0.0 {
            total += f64::from(p) * f64::from(t - s);
        }
    });

    let scale = 1.0 / rows as f32;
    let mut grad = student_log_probs.mapv_into(f32::exp);
    Zip::from(&mut grad).and(&teacher_log_probs).for_each(|g, &t| *g = (*g - t.exp()) * scale);

    let loss = if teacher_logits.iter().all(|v| v.is_finite()) { total / rows as f64 } else { f64::NAN };
    Ok(LossOutput { loss, grad })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let probs = softmax(array![[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0]].view());
        for row in probs.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-6);
        }
        assert_relative_eq!(probs[[1, 0]], 1.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cross_entropy_of_uniform_logits() {
        let out = cross_entropy(array![[0.0, 0.0], [0.0, 0.0]].view(), &[0, 1]).unwrap();
        assert_relative_eq!(out.loss, std::f64::consts::LN_2, epsilon = 1e-6);
        assert_relative_eq!(out.grad[[0, 0]], -0.25, epsilon = 1e-6);
        assert_relative_eq!(out.grad[[0, 1]], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_cross_entropy_rejects_bad_labels() {
        let logits = array![[0.0, 0.0]];
        assert!(cross_entropy(logits.view(), &[2]).is_err());
        assert!(cross_entropy(logits.view(), &[0, 1]).is_err());
    }

    #[test]
    fn test_kl_of_identical_logits_is_zero() {
        let logits = array![[0.3, -1.0, 2.0], [1.0, 1.0, 0.0]];
        let out = kl_div_batchmean(logits.view(), logits.view()).unwrap();
        assert_relative_eq!(out.loss, 0.0, epsilon = 1e-6);
        assert!(out.grad.iter().all(|g| g.abs() < 1e-6));
    }

    #[test]
    fn test_kl_is_positive_for_different_distributions() {
        let student = array![[0.0, 0.0]];
        let teacher = array![[5.0, 0.0]];
        let out = kl_div_batchmean(student.view(), teacher.view()).unwrap();
        assert!(out.loss > 0.0);
        // student must raise class 0
        assert!(out.grad[[0, 0]] < 0.0);
        assert!(kl_div_batchmean(student.view(), array![[1.0, 2.0, 3.0]].view()).is_err());
    }

    #[test]
    fn test_kl_against_non_finite_teacher_is_nan() {
        let student = array![[0.0, 1.0]];
        let out = kl_div_batchmean(student.view(), array![[f32::NAN, 0.0]].view()).unwrap();
        assert!(out.loss.is_nan());
        let out = kl_div_batchmean(student.view(), array![[f32::INFINITY, 0.0]].view()).unwrap();
        assert!(!out.loss.is_finite());
    }
}
