use std::time::{Duration, Instant};

use collective::{
    Communicator, DistributedOptimizer, broadcast_optimizer_state, broadcast_parameters,
};
use log::{debug, info};
use machine_learning::{
    arch::{Model, loss::CrossEntropy},
    dataset::{DataLoader, Dataset, DistributedSampler},
    optimization::GradientDescentWithMomentum,
    training::{EpochStats, ModelTrainer},
};
use rand::{SeedableRng, rngs::StdRng};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    runtime::{Handle, RuntimeFlavor},
    task,
};

use crate::{Result, config::TrainOptions};

/// The rank that initializes the replicas and reports the results.
const ROOT: usize = 0;

/// The base seed of the samplers, shared by every rank.
const SAMPLER_SEED: u64 = 0;

/// The rank averaged metrics of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: u64,
    pub train_loss: f32,
    pub train_accuracy: f32,
    pub test_loss: f32,
    pub test_accuracy: f32,
    pub elapsed: Duration,
}

/// One rank's share of a data-parallel training run.
pub struct Session<M, R, W>
where
    M: Model,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    comm: Communicator<R, W>,
    trainer: ModelTrainer<M, CrossEntropy>,
    optimizer: DistributedOptimizer<GradientDescentWithMomentum>,
    train_set: Dataset,
    test_set: Dataset,
    train_sampler: DistributedSampler,
    test_sampler: DistributedSampler,
    options: TrainOptions,
}

impl<M, R, W> Session<M, R, W>
where
    M: Model,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Sets up the replica of this rank.
    ///
    /// Parameters are initialized from `options.seed` and then overwritten by the root's, along
    /// with the optimizer state, so every replica starts from the same point. The learning rate
    /// is scaled by the world size.
    ///
    /// # Arguments
    /// * `comm` - This rank's communicator.
    /// * `model` - The network to train.
    /// * `train_set` - The full training set, sharded by a sampler.
    /// * `test_set` - The full test set, sharded by a sampler.
    /// * `options` - The hyperparameters of the run.
    pub async fn new(
        mut comm: Communicator<R, W>,
        model: M,
        train_set: Dataset,
        test_set: Dataset,
        options: TrainOptions,
    ) -> Result<Self> {
        let (rank, size) = (comm.rank(), comm.size());

        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut params = vec![0.0; model.size()];
        model.init_params(&mut params, &mut rng)?;
        let len = params.len();
        debug!(rank = rank, params = len; "model initialized");

        let mut trainer = ModelTrainer::new(model, params, CrossEntropy::new())?;
        let mut inner =
            GradientDescentWithMomentum::new(len, options.lr * size as f32, options.momentum);

        broadcast_parameters(&mut comm, trainer.params_mut().params_mut(), ROOT).await?;
        broadcast_optimizer_state(&mut comm, &mut inner, ROOT).await?;

        let train_sampler =
            DistributedSampler::new(train_set.len(), size, rank, true, SAMPLER_SEED)?;
        let test_sampler = DistributedSampler::new(test_set.len(), size, rank, true, SAMPLER_SEED)?;

        Ok(Self {
            comm,
            trainer,
            optimizer: DistributedOptimizer::new(inner, options.compression),
            train_set,
            test_set,
            train_sampler,
            test_sampler,
            options,
        })
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn params(&self) -> &[f32] {
        self.trainer.params().params()
    }

    /// Trains over this rank's shard for one epoch.
    ///
    /// # Returns
    /// The rank averaged loss and accuracy.
    pub async fn train(&mut self, epoch: u64) -> Result<(f32, f32)> {
        let rank = self.comm.rank();
        self.train_sampler.set_epoch(epoch);
        let num_samples = self.train_sampler.num_samples();

        let loader = DataLoader::new(
            &self.train_set,
            self.train_sampler.indices(),
            self.options.batch_size,
        )?;
        let num_batches = loader.num_batches();
        let mut stats = EpochStats::new();

        for (batch_idx, batch) in loader.enumerate() {
            let batch = batch?;
            let batch_len = batch.len();
            let batch_stats = compute(|| self.trainer.train_batch(batch))?;

            let (grad, params) = self.trainer.params_mut().split_mut();
            self.optimizer.step(&mut self.comm, grad, params).await?;
            stats.add(&batch_stats);

            if batch_idx % self.options.log_interval == 0 {
                info!(
                    "[{rank}] Train Epoch: {epoch} [{}/{num_samples} ({:.0}%)]\tLoss: {:.6}",
                    batch_idx * batch_len,
                    100.0 * batch_idx as f32 / num_batches as f32,
                    batch_stats.loss / self.options.batch_size as f32
                );
            }
        }

        let (loss, accuracy) = stats.averages(num_samples);
        let loss = self.comm.metric_average(loss, "running_loss").await?;
        let accuracy = self.comm.metric_average(accuracy, "training_acc").await?;

        if self.comm.is_root() {
            info!(
                "Training set: Average loss: {loss:.4}, Accuracy: {:.2}%",
                accuracy * 100.0
            );
        }

        Ok((loss, accuracy))
    }

    /// Evaluates the model over this rank's shard of the test set.
    ///
    /// # Returns
    /// The rank averaged loss and accuracy.
    pub async fn test(&mut self) -> Result<(f32, f32)> {
        let num_samples = self.test_sampler.num_samples();
        let loader = DataLoader::new(
            &self.test_set,
            self.test_sampler.indices(),
            self.options.test_batch_size,
        )?;

        let mut stats = EpochStats::new();
        for batch in loader {
            let batch = batch?;
            stats.add(&compute(|| self.trainer.eval_batch(batch))?);
        }

        let (loss, accuracy) = stats.averages(num_samples);
        let loss = self.comm.metric_average(loss, "avg_loss").await?;
        let accuracy = self.comm.metric_average(accuracy, "avg_accuracy").await?;

        if self.comm.is_root() {
            info!(
                "Test set: Average loss: {loss:.4}, Accuracy: {:.2}%",
                accuracy * 100.0
            );
        }

        Ok((loss, accuracy))
    }

    /// Runs every epoch, then leaves the ring.
    pub async fn run(mut self) -> Result<Vec<EpochReport>> {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(self.options.epochs as usize);

        for epoch in 1..=self.options.epochs {
            let epoch_start = Instant::now();
            let (train_loss, train_accuracy) = self.train(epoch).await?;
            let (test_loss, test_accuracy) = self.test().await?;
            let elapsed = epoch_start.elapsed();

            if self.comm.is_root() {
                info!("Epoch - {epoch} time: {:.3} seconds", elapsed.as_secs_f64());
            }

            reports.push(EpochReport {
                epoch,
                train_loss,
                train_accuracy,
                test_loss,
                test_accuracy,
                elapsed,
            });
        }

        if self.comm.is_root() {
            info!(
                "Total training time: {:.3} seconds",
                start.elapsed().as_secs_f64()
            );
        }

        self.shutdown().await?;
        Ok(reports)
    }

    /// Leaves the ring.
    pub async fn shutdown(self) -> Result<()> {
        self.comm.shutdown().await?;
        Ok(())
    }
}

/// Runs CPU bound work on the current task, telling a multi threaded runtime to move its other
/// tasks away first. A current thread runtime has nowhere to move them, so `f` just runs.
fn compute<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => task::block_in_place(f),
        _ => f(),
    }
}
