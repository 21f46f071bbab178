use ndarray::ArrayD;
use rand::Rng;

use super::{Model, layers::Layer};
use crate::{MlErr, Result, training::ParamManager};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn check_size(&self, got: usize) -> Result<()> {
        let expected = self.size();
        if got != expected {
            return Err(MlErr::SizeMismatch {
                what: "parameters",
                got,
                expected,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(Layer::size).sum()
    }

    fn init_params<R: Rng>(&self, mut params: &mut [f32], rng: &mut R) -> Result<()> {
        self.check_size(params.len())?;

        for layer in &self.layers {
            let (head, tail) = std::mem::take(&mut params).split_at_mut(layer.size());
            layer.init(head, rng)?;
            params = tail;
        }

        Ok(())
    }

    fn set_training(&mut self, training: bool) {
        self.layers
            .iter_mut()
            .for_each(|layer| layer.set_training(training));
    }

    fn forward(&mut self, param_manager: &ParamManager, mut x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        self.check_size(param_manager.len())?;
        let mut front = param_manager.front();

        for layer in self.layers.iter_mut() {
            let params = front.next(layer.size()).ok_or(MlErr::SizeMismatch {
                what: "parameters",
                got: param_manager.len(),
                expected: layer.size(),
            })?;

            x = layer.forward(params, x)?;
        }

        Ok(x)
    }

    fn backward(&mut self, param_manager: &mut ParamManager, mut d: ArrayD<f32>) -> Result<()> {
        self.check_size(param_manager.len())?;
        let len = param_manager.len();
        let mut back = param_manager.back();

        for layer in self.layers.iter_mut().rev() {
            let (params, grad) = back.next(layer.size()).ok_or(MlErr::SizeMismatch {
                what: "parameters",
                got: len,
                expected: layer.size(),
            })?;

            d = layer.backward(params, grad, d)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::arch::activations::ActFn;

    fn two_layer() -> Sequential {
        Sequential::new([
            Layer::dense((2, 3), Some(ActFn::relu())),
            Layer::dense((3, 1), None),
        ])
    }

    #[test]
    fn size_is_the_sum_of_layer_sizes() {
        assert_eq!(two_layer().size(), 3 * 3 + 4);
    }

    #[test]
    fn init_stays_within_fan_in_bounds() {
        let model = two_layer();
        let mut params = vec![0.0; model.size()];
        model
            .init_params(&mut params, &mut StdRng::seed_from_u64(1))
            .unwrap();

        let bound = 1.0 / 2f32.sqrt();
        assert!(params[..9].iter().all(|p| p.abs() <= bound));
        assert!(params.iter().any(|&p| p != 0.0));
    }

    #[test]
    fn wrong_parameter_count_is_rejected() {
        let mut model = two_layer();
        let manager = ParamManager::new(3);
        let err = model
            .forward(&manager, Array2::zeros((1, 2)).into_dyn())
            .unwrap_err();

        assert!(matches!(err, MlErr::SizeMismatch { got: 3, expected: 13, .. }));
    }

    #[test]
    fn backward_fills_gradient_for_every_layer() {
        let mut model = two_layer();
        let mut params = vec![0.0; model.size()];
        model
            .init_params(&mut params, &mut StdRng::seed_from_u64(7))
            .unwrap();
        // make sure the hidden units are active
        params[6..9].fill(2.0);
        let mut manager = ParamManager::from_params(params);

        let y = model
            .forward(&manager, array![[1.0, -1.0]].into_dyn())
            .unwrap();
        assert_eq!(y.shape(), &[1, 1]);

        model
            .backward(&mut manager, Array2::ones((1, 1)).into_dyn())
            .unwrap();

        // the output bias gradient is the upstream delta
        assert_eq!(manager.grad()[12], 1.0);
        assert!(manager.grad()[..9].iter().any(|&g| g != 0.0));
    }
}
