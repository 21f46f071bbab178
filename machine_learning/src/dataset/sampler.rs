use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{MlErr, Result};

/// Splits the indices of a dataset among the ranks of a data parallel run.
///
/// Every rank draws `num_samples = ceil(len / num_replicas)` indices. The (optionally shuffled)
/// index list is padded by wrapping around until it divides evenly, then rank `r` takes every
/// `num_replicas`-th index starting at `r`. Ranks sharing a `seed` and an `epoch` agree on the
/// permutation, so their shards are disjoint apart from the padding.
#[derive(Debug, Clone)]
pub struct DistributedSampler {
    len: usize,
    num_replicas: usize,
    rank: usize,
    shuffle: bool,
    seed: u64,
    epoch: u64,
}

impl DistributedSampler {
    /// Creates a new `DistributedSampler`.
    ///
    /// # Arguments
    /// * `len` - The length of the dataset.
    /// * `num_replicas` - The amount of ranks sharing the dataset.
    /// * `rank` - This rank.
    /// * `shuffle` - Whether to permute the indices every epoch.
    /// * `seed` - The base seed of the permutation, must be the same on every rank.
    ///
    /// # Returns
    /// A new `DistributedSampler` or an error if `rank` is not smaller than `num_replicas`.
    pub fn new(
        len: usize,
        num_replicas: usize,
        rank: usize,
        shuffle: bool,
        seed: u64,
    ) -> Result<Self> {
        if rank >= num_replicas {
            return Err(MlErr::IndexOutOfBounds {
                index: rank,
                len: num_replicas,
            });
        }

        Ok(Self {
            len,
            num_replicas,
            rank,
            shuffle,
            seed,
            epoch: 0,
        })
    }

    /// Sets the epoch mixed into the permutation seed.
    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    /// Returns the amount of indices this rank draws per epoch.
    pub fn num_samples(&self) -> usize {
        self.len.div_ceil(self.num_replicas)
    }

    pub fn total_size(&self) -> usize {
        self.num_samples() * self.num_replicas
    }

    /// Returns this rank's indices for the current epoch.
    pub fn indices(&self) -> Vec<usize> {
        if self.len == 0 {
            return Vec::new();
        }

        let mut indices: Vec<usize> = (0..self.len).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epoch));
            indices.shuffle(&mut rng);
        }

        let padding = self.total_size() - self.len;
        for i in 0..padding {
            indices.push(indices[i % self.len]);
        }

        indices
            .into_iter()
            .skip(self.rank)
            .step_by(self.num_replicas)
            .collect()
    }
}
