/// The outcome of a single batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchStats {
    /// The mean loss over the batch.
    pub loss: f32,
    /// The amount of correctly classified samples.
    pub correct: usize,
    /// The amount of samples in the batch.
    pub len: usize,
}

/// Accumulates batch results over an epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochStats {
    /// The sum of the batch mean losses.
    pub running_loss: f32,
    pub correct: usize,
    pub seen: usize,
    pub batches: usize,
}

impl EpochStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, batch: &BatchStats) {
        self.running_loss += batch.loss;
        self.correct += batch.correct;
        self.seen += batch.len;
        self.batches += 1;
    }

    /// Returns the running loss and the accuracy, both divided by `num_samples` (the length of
    /// this rank's shard).
    pub fn averages(&self, num_samples: usize) -> (f32, f32) {
        let n = num_samples.max(1) as f32;
        (self.running_loss / n, self.correct as f32 / n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_and_averages_over_the_shard() {
        let mut stats = EpochStats::new();
        stats.add(&BatchStats {
            loss: 2.0,
            correct: 3,
            len: 4,
        });
        stats.add(&BatchStats {
            loss: 1.0,
            correct: 1,
            len: 2,
        });

        assert_eq!(stats.seen, 6);
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.averages(6), (0.5, 4.0 / 6.0));
    }

    #[test]
    fn empty_shard_does_not_divide_by_zero() {
        assert_eq!(EpochStats::new().averages(0), (0.0, 0.0));
    }
}
