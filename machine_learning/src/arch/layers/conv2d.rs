use ndarray::{Array3, ArrayD, Axis, Ix4, Zip, linalg, prelude::*};
use rand::Rng;

use crate::{MlErr, Result, arch::activations::ActFn};

/// The spatial arrangement of a convolution over a given input size.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    kernel: usize,
    stride: usize,
    padding: usize,
    h: usize,
    w: usize,
    oh: usize,
    ow: usize,
}

impl Geometry {
    /// Maps an output coordinate and a kernel offset onto the (unpadded) input coordinate.
    fn source(&self, out: usize, offset: usize, limit: usize) -> Option<usize> {
        (out * self.stride + offset)
            .checked_sub(self.padding)
            .filter(|&i| i < limit)
    }
}

/// A 2D convolution over `(N, C, H, W)` inputs, computed as a matrix product of the kernels with
/// the unrolled input patches (im2col).
///
/// The parameter slice holds the `(out, in * k * k)` kernels in row major order followed by the
/// `out` biases.
#[derive(Debug, Clone)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    act_fn: Option<ActFn>,

    // Forward metadata
    cols: Option<Array3<f32>>,
    z: Option<Array4<f32>>,
    geometry: Option<Geometry>,
}

impl Conv2d {
    /// Creates a new `Conv2d` layer.
    ///
    /// # Arguments
    /// * `channels` - The amount of input and output channels.
    /// * `kernel` - The side of the square kernel.
    /// * `stride` - The step between two consecutive kernel applications.
    /// * `padding` - The amount of zeros surrounding the input on each side.
    /// * `act_fn` - An optional activation applied to the output.
    pub fn new(
        channels: (usize, usize),
        kernel: usize,
        stride: usize,
        padding: usize,
        act_fn: Option<ActFn>,
    ) -> Self {
        Self {
            in_channels: channels.0,
            out_channels: channels.1,
            kernel,
            stride: stride.max(1),
            padding,
            act_fn,
            cols: None,
            z: None,
            geometry: None,
        }
    }

    pub fn size(&self) -> usize {
        self.out_channels * (self.patch_len() + 1)
    }

    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        super::fan_in_uniform(params, self.patch_len(), rng)
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = super::standard_layout(x).into_dimensionality::<Ix4>()?;
        let (n, c, h, w) = x.dim();
        if c != self.in_channels {
            return Err(MlErr::SizeMismatch {
                what: "conv2d input channels",
                got: c,
                expected: self.in_channels,
            });
        }

        let g = self.geometry(h, w)?;
        let (kernels, biases) = self.view_params(params)?;
        let mut cols = Array3::zeros((n, self.patch_len(), g.oh * g.ow));
        let mut z = Array3::zeros((n, self.out_channels, g.oh * g.ow));

        Zip::from(cols.outer_iter_mut())
            .and(z.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut cols, mut z, x| {
                im2col(x, cols.view_mut(), &g);
                linalg::general_mat_mul(1.0, &kernels, &cols, 0.0, &mut z);
                z.outer_iter_mut()
                    .zip(biases.iter())
                    .for_each(|(mut row, &b)| row += b);
            });

        let z = z.into_shape_with_order((n, self.out_channels, g.oh, g.ow))?;
        let out = match &self.act_fn {
            Some(act_fn) => {
                let a = z.mapv(|z| act_fn.f(z));
                self.z = Some(z);
                a
            }
            None => z,
        };

        self.cols = Some(cols);
        self.geometry = Some(g);
        Ok(out.into_dyn())
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        let mut d = super::standard_layout(d).into_dimensionality::<Ix4>()?;
        let cols = self
            .cols
            .take()
            .ok_or(MlErr::BackwardBeforeForward { layer: "conv2d" })?;
        let g = self
            .geometry
            .take()
            .ok_or(MlErr::BackwardBeforeForward { layer: "conv2d" })?;

        if let Some(act_fn) = &self.act_fn {
            let z = self
                .z
                .take()
                .ok_or(MlErr::BackwardBeforeForward { layer: "conv2d" })?;

            d.zip_mut_with(&z, |d, &z| *d *= act_fn.df(z));
        }

        let n = d.len_of(Axis(0));
        let d = d.into_shape_with_order((n, self.out_channels, g.oh * g.ow))?;

        let (mut dk, mut db) = self.view_grad(grad)?;
        for (d, cols) in d.outer_iter().zip(cols.outer_iter()) {
            linalg::general_mat_mul(1.0, &d, &cols.t(), 1.0, &mut dk);
        }
        db += &d.sum_axis(Axis(2)).sum_axis(Axis(0));

        let (kernels, _) = self.view_params(params)?;
        let mut dx = Array4::zeros((n, self.in_channels, g.h, g.w));

        Zip::from(dx.outer_iter_mut())
            .and(d.outer_iter())
            .par_for_each(|dx, d| {
                let dcols = kernels.t().dot(&d);
                col2im(dcols.view(), dx, &g);
            });

        Ok(dx.into_dyn())
    }

    /// The length of one unrolled input patch, which is also the fan in of every output unit.
    fn patch_len(&self) -> usize {
        self.in_channels * self.kernel * self.kernel
    }

    fn geometry(&self, h: usize, w: usize) -> Result<Geometry> {
        let (ph, pw) = (h + 2 * self.padding, w + 2 * self.padding);
        if ph < self.kernel || pw < self.kernel {
            return Err(MlErr::SizeMismatch {
                what: "conv2d padded input side",
                got: ph.min(pw),
                expected: self.kernel,
            });
        }

        Ok(Geometry {
            kernel: self.kernel,
            stride: self.stride,
            padding: self.padding,
            h,
            w,
            oh: (ph - self.kernel) / self.stride + 1,
            ow: (pw - self.kernel) / self.stride + 1,
        })
    }

    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        let dim = (self.out_channels, self.patch_len());
        let (dk_raw, db_raw) = grad.split_at_mut(dim.0 * dim.1);
        let dk = ArrayViewMut2::from_shape(dim, dk_raw)?;
        let db = ArrayViewMut1::from_shape(self.out_channels, db_raw)?;
        Ok((dk, db))
    }

    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let dim = (self.out_channels, self.patch_len());
        let (k_raw, b_raw) = params.split_at(dim.0 * dim.1);
        let kernels = ArrayView2::from_shape(dim, k_raw)?;
        let biases = ArrayView1::from_shape(self.out_channels, b_raw)?;
        Ok((kernels, biases))
    }
}

/// Unrolls every kernel sized patch of `x` into a column of `cols`.
fn im2col(x: ArrayView3<f32>, mut cols: ArrayViewMut2<f32>, g: &Geometry) {
    let k = g.kernel;
    for c in 0..x.len_of(Axis(0)) {
        for ki in 0..k {
            for kj in 0..k {
                let row = (c * k + ki) * k + kj;
                for oy in 0..g.oh {
                    let iy = g.source(oy, ki, g.h);
                    for ox in 0..g.ow {
                        cols[[row, oy * g.ow + ox]] = match (iy, g.source(ox, kj, g.w)) {
                            (Some(iy), Some(ix)) => x[[c, iy, ix]],
                            _ => 0.0,
                        };
                    }
                }
            }
        }
    }
}

/// Folds the patch columns back onto the input, accumulating overlapping contributions.
fn col2im(cols: ArrayView2<f32>, mut dx: ArrayViewMut3<f32>, g: &Geometry) {
    let k = g.kernel;
    for c in 0..dx.len_of(Axis(0)) {
        for ki in 0..k {
            for kj in 0..k {
                let row = (c * k + ki) * k + kj;
                for oy in 0..g.oh {
                    let Some(iy) = g.source(oy, ki, g.h) else {
                        continue;
                    };

                    for ox in 0..g.ow {
                        if let Some(ix) = g.source(ox, kj, g.w) {
                            dx[[c, iy, ix]] += cols[[row, oy * g.ow + ox]];
                        }
                    }
                }
            }
        }
    }
}
