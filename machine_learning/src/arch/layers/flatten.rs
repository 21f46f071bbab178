use ndarray::{ArrayD, Axis, IxDyn};

use crate::{MlErr, Result};

/// Collapses every axis but the first (the batch) into one.
#[derive(Debug, Clone, Default)]
pub struct Flatten {
    input_shape: Option<IxDyn>,
}

impl Flatten {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = super::standard_layout(x);
        let n = x.len_of(Axis(0));
        let features = x.len() / n.max(1);

        self.input_shape = Some(x.raw_dim());
        Ok(x.into_shape_with_order(IxDyn(&[n, features]))?)
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let shape = self
            .input_shape
            .take()
            .ok_or(MlErr::BackwardBeforeForward { layer: "flatten" })?;

        Ok(super::standard_layout(d).into_shape_with_order(shape)?)
    }
}
