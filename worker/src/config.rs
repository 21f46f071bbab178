use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use collective::Compression;

use crate::{Result, WorkerErr};

/// Where the model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Device {
    Cpu,
    Gpu,
}

/// Data-parallel CIFAR-10 training, one process per rank.
#[derive(Parser, Debug, Clone)]
#[command(name = "worker")]
pub struct Args {
    /// Input batch size for training
    #[arg(long, alias = "batch_size", default_value_t = 64)]
    pub batch_size: usize,

    /// Input batch size for testing
    #[arg(long, default_value_t = 64)]
    pub test_batch_size: usize,

    /// Number of epochs to train
    #[arg(long, default_value_t = 10)]
    pub epochs: u64,

    /// Learning rate, scaled by the amount of ranks
    #[arg(long, default_value_t = 0.01)]
    pub lr: f32,

    /// SGD momentum
    #[arg(long, default_value_t = 0.5)]
    pub momentum: f32,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// How many batches to wait before logging training status
    #[arg(long, default_value_t = 10)]
    pub log_interval: usize,

    /// Use fp16 compression during all-reduce
    #[arg(long)]
    pub fp16_allreduce: bool,

    /// Whether this is running on cpu or gpu
    #[arg(long, value_enum, default_value_t = Device::Cpu)]
    pub device: Device,

    /// Number of compute threads per worker, 0 keeps the default
    #[arg(long, alias = "num_threads", default_value_t = 0)]
    pub num_threads: usize,

    /// Directory holding cifar-10-batches-bin
    #[arg(long, default_value = "datasets")]
    pub data_dir: PathBuf,

    /// Fetch CIFAR-10 into --data-dir when it is missing
    #[arg(long)]
    pub download: bool,

    /// Width of the hidden dense layers
    #[arg(long, default_value_t = machine_learning::arch::ALEXNET_HIDDEN)]
    pub hidden: usize,
}

/// The knobs of a training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainOptions {
    pub batch_size: usize,
    pub test_batch_size: usize,
    pub epochs: u64,
    pub lr: f32,
    pub momentum: f32,
    pub seed: u64,
    pub log_interval: usize,
    pub compression: Compression,
}

impl Args {
    /// Checks the arguments that can't be expressed through clap alone.
    pub fn validate(&self) -> Result<()> {
        if self.device == Device::Gpu {
            return Err(WorkerErr::Config(
                "gpu training is not supported, use --device cpu".into(),
            ));
        }

        if self.batch_size == 0 || self.test_batch_size == 0 {
            return Err(WorkerErr::Config("batch sizes must be positive".into()));
        }

        if self.log_interval == 0 {
            return Err(WorkerErr::Config("log interval must be positive".into()));
        }

        Ok(())
    }

    pub fn compression(&self) -> Compression {
        if self.fp16_allreduce {
            Compression::Fp16
        } else {
            Compression::None
        }
    }

    pub fn train_options(&self) -> TrainOptions {
        TrainOptions {
            batch_size: self.batch_size,
            test_batch_size: self.test_batch_size,
            epochs: self.epochs,
            lr: self.lr,
            momentum: self.momentum,
            seed: self.seed,
            log_interval: self.log_interval,
            compression: self.compression(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_flags() {
        let args = Args::parse_from(["worker"]);

        assert_eq!(args.batch_size, 64);
        assert_eq!(args.test_batch_size, 64);
        assert_eq!(args.epochs, 10);
        assert_eq!(args.lr, 0.01);
        assert_eq!(args.momentum, 0.5);
        assert_eq!(args.seed, 42);
        assert_eq!(args.log_interval, 10);
        assert_eq!(args.device, Device::Cpu);
        assert_eq!(args.compression(), Compression::None);
        assert!(!args.download);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn download_is_opt_in() {
        let args = Args::parse_from(["worker", "--download", "--data-dir", "/tmp/cifar"]);
        assert!(args.download);
        assert_eq!(args.data_dir, PathBuf::from("/tmp/cifar"));
    }

    #[test]
    fn underscore_spellings_are_accepted() {
        let args = Args::parse_from(["worker", "--batch_size", "8", "--num_threads", "2"]);
        assert_eq!(args.batch_size, 8);
        assert_eq!(args.num_threads, 2);
    }

    #[test]
    fn fp16_flag_selects_compression() {
        let args = Args::parse_from(["worker", "--fp16-allreduce"]);
        assert_eq!(args.train_options().compression, Compression::Fp16);
    }

    #[test]
    fn gpu_is_rejected() {
        let args = Args::parse_from(["worker", "--device", "gpu"]);
        assert!(matches!(args.validate(), Err(WorkerErr::Config(_))));
    }
}
