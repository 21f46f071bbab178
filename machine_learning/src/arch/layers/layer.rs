use ndarray::ArrayD;
use rand::Rng;

use super::{Conv2d, Dense, Dropout, Flatten, MaxPool2d};
use crate::{Result, arch::activations::ActFn};

/// A layer of a sequential network.
///
/// Layers never own their parameters: each call receives the slice of the flat parameter buffer
/// that belongs to it.
#[derive(Debug, Clone)]
pub enum Layer {
    Conv2d(Conv2d),
    MaxPool2d(MaxPool2d),
    Dense(Dense),
    Dropout(Dropout),
    Flatten(Flatten),
}

impl Layer {
    pub fn conv2d(
        channels: (usize, usize),
        kernel: usize,
        stride: usize,
        padding: usize,
        act_fn: Option<ActFn>,
    ) -> Self {
        Self::Conv2d(Conv2d::new(channels, kernel, stride, padding, act_fn))
    }

    pub fn max_pool2d(kernel: usize) -> Self {
        Self::MaxPool2d(MaxPool2d::new(kernel))
    }

    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self::Dense(Dense::new(dim, act_fn))
    }

    pub fn dropout(p: f32, seed: u64) -> Result<Self> {
        Ok(Self::Dropout(Dropout::new(p, seed)?))
    }

    pub fn flatten() -> Self {
        Self::Flatten(Flatten::new())
    }

    /// Returns the amount of parameters this layer takes from the flat buffer.
    pub fn size(&self) -> usize {
        match self {
            Self::Conv2d(l) => l.size(),
            Self::Dense(l) => l.size(),
            Self::MaxPool2d(_) | Self::Dropout(_) | Self::Flatten(_) => 0,
        }
    }

    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        match self {
            Self::Conv2d(l) => l.init(params, rng),
            Self::Dense(l) => l.init(params, rng),
            Self::MaxPool2d(_) | Self::Dropout(_) | Self::Flatten(_) => Ok(()),
        }
    }

    pub fn set_training(&mut self, training: bool) {
        if let Self::Dropout(l) = self {
            l.set_training(training);
        }
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        match self {
            Self::Conv2d(l) => l.forward(params, x),
            Self::MaxPool2d(l) => l.forward(x),
            Self::Dense(l) => l.forward(params, x),
            Self::Dropout(l) => Ok(l.forward(x)),
            Self::Flatten(l) => l.forward(x),
        }
    }

    /// Accumulates the layer's gradient into `grad` and returns the delta for the previous layer.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        match self {
            Self::Conv2d(l) => l.backward(params, grad, d),
            Self::MaxPool2d(l) => l.backward(d),
            Self::Dense(l) => l.backward(params, grad, d),
            Self::Dropout(l) => Ok(l.backward(d)),
            Self::Flatten(l) => l.backward(d),
        }
    }
}
