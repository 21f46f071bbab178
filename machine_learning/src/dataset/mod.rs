pub mod cifar10;
mod loader;
mod sampler;

pub use loader::DataLoader;
pub use sampler::DistributedSampler;

use ndarray::Array4;

use crate::{MlErr, Result};

/// Maps a stored pixel byte to the value fed to the network.
pub type Transform = fn(u8) -> f32;

/// An in memory image classification dataset: `len` images of shape `(channels, height, width)`,
/// stored channel planar one after the other, and one label per image.
///
/// Pixels stay as bytes and go through the dataset's transform when a batch is gathered.
#[derive(Debug, Clone)]
pub struct Dataset {
    pixels: Vec<u8>,
    labels: Vec<u8>,
    shape: (usize, usize, usize),
    transform: Transform,
}

/// A batch of images `(N, C, H, W)` with their labels.
#[derive(Debug, Clone)]
pub struct Batch {
    pub x: Array4<f32>,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `pixels` - The raw pixels of every image.
    /// * `labels` - The class of every image.
    /// * `shape` - The `(channels, height, width)` of a single image.
    /// * `transform` - Applied to every pixel of a gathered batch.
    ///
    /// # Returns
    /// A new `Dataset` or an error if `pixels` doesn't hold exactly one image per label.
    pub fn new(
        pixels: Vec<u8>,
        labels: Vec<u8>,
        shape: (usize, usize, usize),
        transform: Transform,
    ) -> Result<Self> {
        let expected = labels.len() * shape.0 * shape.1 * shape.2;
        if pixels.len() != expected {
            return Err(MlErr::SizeMismatch {
                what: "dataset pixels",
                got: pixels.len(),
                expected,
            });
        }

        Ok(Self {
            pixels,
            labels,
            shape,
            transform,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn image_shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    fn image_len(&self) -> usize {
        self.shape.0 * self.shape.1 * self.shape.2
    }

    /// Gathers the transformed images at `indices` into a new batch, in the given order.
    pub fn batch(&self, indices: &[usize]) -> Result<Batch> {
        let image_len = self.image_len();
        let mut pixels = Vec::with_capacity(indices.len() * image_len);
        let mut labels = Vec::with_capacity(indices.len());

        for &index in indices {
            if index >= self.len() {
                return Err(MlErr::IndexOutOfBounds {
                    index,
                    len: self.len(),
                });
            }

            let start = index * image_len;
            let image = &self.pixels[start..start + image_len];
            pixels.extend(image.iter().copied().map(self.transform));
            labels.push(self.labels[index] as usize);
        }

        let (c, h, w) = self.shape;
        let x = Array4::from_shape_vec((indices.len(), c, h, w), pixels)?;
        Ok(Batch { x, labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Dataset {
        // three 1x1x2 images whose pixels encode their index
        Dataset::new(vec![0, 0, 1, 1, 2, 2], vec![5, 6, 7], (1, 1, 2), |p| p as f32).unwrap()
    }

    #[test]
    fn batch_gathers_in_index_order() {
        let batch = tiny().batch(&[2, 0]).unwrap();

        assert_eq!(batch.x.shape(), &[2, 1, 1, 2]);
        assert_eq!(batch.x[[0, 0, 0, 1]], 2.);
        assert_eq!(batch.x[[1, 0, 0, 0]], 0.);
        assert_eq!(batch.labels, vec![7, 5]);
    }

    #[test]
    fn out_of_range_index_fails() {
        let err = tiny().batch(&[3]).unwrap_err();
        assert!(matches!(err, MlErr::IndexOutOfBounds { index: 3, len: 3 }));
    }

    #[test]
    fn pixel_count_must_match_labels() {
        let err = Dataset::new(vec![0; 5], vec![0, 1], (1, 1, 2), |p| p as f32).unwrap_err();
        assert!(matches!(err, MlErr::SizeMismatch { got: 5, expected: 4, .. }));
    }

    #[test]
    fn batch_applies_the_transform() {
        let dataset = Dataset::new(vec![0, 255], vec![1], (1, 1, 2), |p| p as f32 / 255.0).unwrap();
        let batch = dataset.batch(&[0]).unwrap();

        assert_eq!(batch.x.as_slice().unwrap(), &[0.0, 1.0]);
    }
}
