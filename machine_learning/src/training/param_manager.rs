use rayon::prelude::*;

/// The owner of a model's flat parameter and gradient buffers.
///
/// Layers take consecutive slices of both buffers: the first layer the first `size` values, the
/// next one the following, and so on. `front` walks them in forward order and `back` in reverse,
/// so a whole gradient stays contiguous and can be reduced in one go.
#[derive(Debug, Clone)]
pub struct ParamManager {
    params: Vec<f32>,
    grad: Vec<f32>,
}

impl ParamManager {
    /// Creates a new zeroed `ParamManager` of `len` parameters.
    pub fn new(len: usize) -> Self {
        Self::from_params(vec![0.0; len])
    }

    /// Creates a new `ParamManager` owning `params`, with a zeroed gradient.
    pub fn from_params(params: Vec<f32>) -> Self {
        Self {
            grad: vec![0.0; params.len()],
            params,
        }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    pub fn grad_mut(&mut self) -> &mut [f32] {
        &mut self.grad
    }

    /// Borrows the gradient and the parameters at once, for applying an optimizer step.
    pub fn split_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.grad, &mut self.params)
    }

    /// Zeros out the gradient.
    pub fn zero_grad(&mut self) {
        self.grad.par_iter_mut().for_each(|g| *g = 0.0);
    }

    /// Creates a new `FrontIter` parameter iterator.
    ///
    /// The returned iterator iterates the model's layers forward.
    pub fn front(&self) -> FrontIter<'_> {
        FrontIter {
            params: &self.params,
        }
    }

    /// Creates a new `BackIter` parameter iterator.
    ///
    /// The returned iterator iterates the model's layers backwards.
    pub fn back(&mut self) -> BackIter<'_> {
        BackIter {
            params: &self.params,
            grad: &mut self.grad,
        }
    }
}

/// A model's layer iterator.
///
/// This iterator iterates the layers of a model from the front.
pub struct FrontIter<'pm> {
    params: &'pm [f32],
}

impl<'pm> FrontIter<'pm> {
    /// Tries to yield the next layer's parameters.
    ///
    /// # Returns
    /// The next `size` parameters or `None` if there aren't that many left.
    pub fn next(&mut self, size: usize) -> Option<&'pm [f32]> {
        let (head, tail) = self.params.split_at_checked(size)?;
        self.params = tail;
        Some(head)
    }
}

/// A model's layer iterator.
///
/// This iterator iterates the layers of a model from the back.
pub struct BackIter<'pm> {
    params: &'pm [f32],
    grad: &'pm mut [f32],
}

impl<'pm> BackIter<'pm> {
    /// Tries to yield the next layer's parameters and gradient.
    ///
    /// # Returns
    /// The last `size` parameters and gradient values or `None` if there aren't that many left.
    pub fn next(&mut self, size: usize) -> Option<(&'pm [f32], &'pm mut [f32])> {
        let mid = self.params.len().checked_sub(size)?;
        let (params, params_tail) = self.params.split_at(mid);
        let (grad, grad_tail) = std::mem::take(&mut self.grad).split_at_mut(mid);

        self.params = params;
        self.grad = grad;
        Some((params_tail, grad_tail))
    }
}
