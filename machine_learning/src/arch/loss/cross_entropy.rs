use ndarray::{Array2, ArrayView2, Axis};

use super::LossFn;
use crate::{MlErr, Result};

/// Softmax cross entropy: the batch mean of `-log softmax(logits)[label]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }

    fn check(logits: ArrayView2<f32>, labels: &[usize]) -> Result<()> {
        if logits.nrows() != labels.len() {
            return Err(MlErr::SizeMismatch {
                what: "labels",
                got: labels.len(),
                expected: logits.nrows(),
            });
        }

        let classes = logits.ncols();
        match labels.iter().find(|&&label| label >= classes) {
            Some(&label) => Err(MlErr::InvalidLabel { label, classes }),
            None => Ok(()),
        }
    }
}

/// Computes the row wise softmax, shifting by the row maximum to avoid overflow.
pub fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut probs = logits.to_owned();
    for mut row in probs.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }

    probs
}

/// Returns the index of the largest score of every row.
pub fn argmax(logits: ArrayView2<f32>) -> Vec<usize> {
    logits
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                    if v > best.1 { (i, v) } else { best }
                })
                .0
        })
        .collect()
}

impl LossFn for CrossEntropy {
    fn loss(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Result<f32> {
        Self::check(logits, labels)?;
        if labels.is_empty() {
            return Ok(0.0);
        }

        let total: f32 = logits
            .axis_iter(Axis(0))
            .zip(labels)
            .map(|(row, &label)| {
                let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                let log_sum_exp = row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln() + max;
                log_sum_exp - row[label]
            })
            .sum();

        Ok(total / labels.len() as f32)
    }

    fn loss_prime(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Result<Array2<f32>> {
        Self::check(logits, labels)?;

        let n = labels.len().max(1) as f32;
        let mut d = softmax(logits);
        for (mut row, &label) in d.axis_iter_mut(Axis(0)).zip(labels) {
            row[label] -= 1.0;
            row /= n;
        }

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn uniform_logits_cost_log_classes() {
        let logits = Array2::zeros((3, 10));
        let loss = CrossEntropy.loss(logits.view(), &[0, 4, 9]).unwrap();
        assert!((loss - 10f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn large_logits_do_not_overflow() {
        let logits = array![[1000., 0.], [0., 1000.]];
        let loss = CrossEntropy.loss(logits.view(), &[0, 1]).unwrap();
        assert!(loss.abs() < 1e-6);

        let probs = softmax(logits.view());
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn gradient_is_softmax_minus_one_hot_over_batch() {
        let logits = array![[0., 0.], [0., 0.]];
        let d = CrossEntropy.loss_prime(logits.view(), &[0, 1]).unwrap();
        assert_eq!(d, array![[-0.25, 0.25], [0.25, -0.25]]);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let logits = array![[0.3, -1.2, 2.0], [1.5, 0.1, -0.4]];
        let labels = [2, 0];
        let d = CrossEntropy.loss_prime(logits.view(), &labels).unwrap();

        let eps = 1e-2;
        for ((i, j), &analytic) in d.indexed_iter() {
            let mut shifted = logits.clone();
            shifted[[i, j]] += eps;
            let up = CrossEntropy.loss(shifted.view(), &labels).unwrap();
            shifted[[i, j]] -= 2.0 * eps;
            let down = CrossEntropy.loss(shifted.view(), &labels).unwrap();

            assert!(((up - down) / (2.0 * eps) - analytic).abs() < 1e-3);
        }
    }

    #[test]
    fn argmax_picks_the_first_maximum() {
        let logits = array![[0., 3., 3.], [5., -1., 2.]];
        assert_eq!(argmax(logits.view()), vec![1, 0]);
    }

    #[test]
    fn invalid_labels_are_rejected() {
        let logits = Array2::zeros((2, 3));
        assert!(matches!(
            CrossEntropy.loss(logits.view(), &[0, 3]),
            Err(MlErr::InvalidLabel { label: 3, classes: 3 })
        ));
        assert!(matches!(
            CrossEntropy.loss(logits.view(), &[0]),
            Err(MlErr::SizeMismatch { .. })
        ));
    }
}
