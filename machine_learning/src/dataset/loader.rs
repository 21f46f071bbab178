use super::{Batch, Dataset};
use crate::{MlErr, Result};

/// Iterates a dataset in batches of `batch_size`, following a list of sample indices. The last
/// batch holds the remainder and may be smaller.
#[derive(Debug)]
pub struct DataLoader<'a> {
    dataset: &'a Dataset,
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> DataLoader<'a> {
    /// Creates a new `DataLoader`.
    ///
    /// # Arguments
    /// * `dataset` - The dataset to read from.
    /// * `indices` - The samples to yield, in order (usually a sampler's indices for an epoch).
    /// * `batch_size` - The maximum amount of samples per batch.
    ///
    /// # Returns
    /// A new `DataLoader` or an error if `batch_size` is zero.
    pub fn new(dataset: &'a Dataset, indices: Vec<usize>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(MlErr::InvalidHyperparameter {
                what: "batch size",
                value: 0.0,
            });
        }

        Ok(Self {
            dataset,
            indices,
            batch_size,
            cursor: 0,
        })
    }

    /// Returns the amount of batches a full pass yields.
    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }
}

impl Iterator for DataLoader<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.indices.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.indices.len());
        let batch = self.dataset.batch(&self.indices[self.cursor..end]);
        self.cursor = end;

        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_full_batches_then_the_remainder() {
        let dataset = Dataset::new((0..5).collect(), vec![0; 5], (1, 1, 1), |p| p as f32).unwrap();
        let loader = DataLoader::new(&dataset, vec![4, 3, 2, 1, 0], 2).unwrap();
        assert_eq!(loader.num_batches(), 3);

        let batches: Vec<_> = loader.map(Result::unwrap).collect();
        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();

        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(batches[0].x[[0, 0, 0, 0]], 4.0);
        assert_eq!(batches[2].x[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let dataset = Dataset::new(vec![], vec![], (1, 1, 1), |p| p as f32).unwrap();
        assert!(DataLoader::new(&dataset, vec![], 0).is_err());
    }
}
