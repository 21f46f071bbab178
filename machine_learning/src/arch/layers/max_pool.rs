use ndarray::{Array4, ArrayD, Ix4, Zip};

use crate::{MlErr, Result};

/// A non overlapping max pooling over `(N, C, H, W)` inputs: every `k x k` window keeps its
/// maximum. Trailing rows and columns that don't fill a window are dropped.
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    kernel: usize,

    // Forward metadata
    argmax: Option<Array4<usize>>,
    input_dim: Option<(usize, usize, usize, usize)>,
}

impl MaxPool2d {
    pub fn new(kernel: usize) -> Self {
        Self {
            kernel: kernel.max(1),
            argmax: None,
            input_dim: None,
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix4>()?;
        let (n, c, h, w) = x.dim();
        let k = self.kernel;
        if h < k || w < k {
            return Err(MlErr::SizeMismatch {
                what: "max pool input side",
                got: h.min(w),
                expected: k,
            });
        }

        let dim = (n, c, h / k, w / k);
        let mut out = Array4::zeros(dim);
        let mut argmax = Array4::zeros(dim);

        Zip::from(out.outer_iter_mut())
            .and(argmax.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut out, mut argmax, x| {
                for ((ch, oy, ox), o) in out.indexed_iter_mut() {
                    let (y0, x0) = (oy * k, ox * k);
                    let mut best = (x[[ch, y0, x0]], y0 * w + x0);
                    for iy in y0..y0 + k {
                        for ix in x0..x0 + k {
                            let v = x[[ch, iy, ix]];
                            // NaN wins the window so it reaches the output.
                            if v > best.0 || (v.is_nan() && !best.0.is_nan()) {
                                best = (v, iy * w + ix);
                            }
                        }
                    }

                    *o = best.0;
                    argmax[[ch, oy, ox]] = best.1;
                }
            });

        self.argmax = Some(argmax);
        self.input_dim = Some((n, c, h, w));
        Ok(out.into_dyn())
    }

    /// Routes every delta to the input position that won its window.
    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let d = d.into_dimensionality::<Ix4>()?;
        let argmax = self
            .argmax
            .take()
            .ok_or(MlErr::BackwardBeforeForward { layer: "max pool" })?;
        let (n, c, h, w) = self
            .input_dim
            .take()
            .ok_or(MlErr::BackwardBeforeForward { layer: "max pool" })?;

        let mut dx = Array4::zeros((n, c, h, w));
        Zip::from(dx.outer_iter_mut())
            .and(d.outer_iter())
            .and(argmax.outer_iter())
            .par_for_each(|mut dx, d, argmax| {
                for ((ch, oy, ox), &idx) in argmax.indexed_iter() {
                    dx[[ch, idx / w, idx % w]] += d[[ch, oy, ox]];
                }
            });

        Ok(dx.into_dyn())
    }
}
