use ndarray::ArrayD;
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Bernoulli, Distribution};

use crate::{MlErr, Result};

/// Zeroes each input with probability `p` while training, scaling the survivors by `1 / (1 - p)`
/// so the expected activation is unchanged. Acts as the identity in evaluation mode.
#[derive(Debug, Clone)]
pub struct Dropout {
    keep: Bernoulli,
    scale: f32,
    rng: StdRng,
    training: bool,

    // Forward metadata
    mask: Option<ArrayD<f32>>,
}

impl Dropout {
    /// Creates a new `Dropout` layer.
    ///
    /// # Arguments
    /// * `p` - The probability of zeroing an input, in `[0, 1)`.
    /// * `seed` - The seed of the mask generator.
    ///
    /// # Returns
    /// A new `Dropout` instance or an error if `p` is out of range.
    pub fn new(p: f32, seed: u64) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(MlErr::InvalidHyperparameter {
                what: "dropout probability",
                value: p,
            });
        }

        let keep = Bernoulli::new(1.0 - p as f64)
            .map_err(|e| MlErr::InvalidDistribution(e.to_string()))?;

        Ok(Self {
            keep,
            scale: 1.0 / (1.0 - p),
            rng: StdRng::seed_from_u64(seed),
            training: true,
            mask: None,
        })
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn forward(&mut self, mut x: ArrayD<f32>) -> ArrayD<f32> {
        if !self.training {
            self.mask = None;
            return x;
        }

        let mask = ArrayD::from_shape_simple_fn(x.raw_dim(), || {
            if self.keep.sample(&mut self.rng) {
                self.scale
            } else {
                0.0
            }
        });

        x *= &mask;
        self.mask = Some(mask);
        x
    }

    pub fn backward(&mut self, mut d: ArrayD<f32>) -> ArrayD<f32> {
        if let Some(mask) = self.mask.take() {
            d *= &mask;
        }

        d
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    #[test]
    fn eval_mode_is_identity() {
        let mut dropout = Dropout::new(0.5, 0).unwrap();
        dropout.set_training(false);

        let x = Array2::from_elem((4, 8), 3.0).into_dyn();
        assert_eq!(dropout.forward(x.clone()), x);
    }

    #[test]
    fn survivors_are_rescaled() {
        let mut dropout = Dropout::new(0.5, 7).unwrap();
        let y = dropout.forward(Array2::ones((16, 64)).into_dyn());

        assert!(y.iter().all(|&v| v == 0.0 || v == 2.0));
        let kept = y.iter().filter(|&&v| v != 0.0).count();
        assert!(kept > 0 && kept < y.len());
    }

    #[test]
    fn backward_reuses_the_forward_mask() {
        let mut dropout = Dropout::new(0.25, 3).unwrap();
        let y = dropout.forward(Array2::ones((8, 8)).into_dyn());
        let d = dropout.backward(Array2::ones((8, 8)).into_dyn());

        assert_eq!(y, d);
    }

    #[test]
    fn same_seed_drops_the_same_units() {
        let mut a = Dropout::new(0.5, 42).unwrap();
        let mut b = Dropout::new(0.5, 42).unwrap();

        let x = Array2::ones((4, 32)).into_dyn();
        assert_eq!(a.forward(x.clone()), b.forward(x));
    }

    #[test]
    fn probability_out_of_range_is_rejected() {
        assert!(Dropout::new(1.0, 0).is_err());
        assert!(Dropout::new(-0.1, 0).is_err());
    }
}
