mod conv2d;
mod dense;
mod dropout;
mod flatten;
mod layer;
mod max_pool;

pub use conv2d::Conv2d;
pub use dense::Dense;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use layer::Layer;
pub use max_pool::MaxPool2d;

use ndarray::ArrayD;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::{MlErr, Result};

/// Returns `x` with a row major memory layout, copying only if it wasn't already.
fn standard_layout(x: ArrayD<f32>) -> ArrayD<f32> {
    if x.is_standard_layout() {
        x
    } else {
        x.as_standard_layout().into_owned()
    }
}

/// Fills `params` from `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`.
fn fan_in_uniform<R: Rng>(params: &mut [f32], fan_in: usize, rng: &mut R) -> Result<()> {
    let bound = 1. / (fan_in.max(1) as f32).sqrt();
    let distribution =
        Uniform::new(-bound, bound).map_err(|e| MlErr::InvalidDistribution(e.to_string()))?;

    params
        .iter_mut()
        .for_each(|p| *p = distribution.sample(rng));

    Ok(())
}
