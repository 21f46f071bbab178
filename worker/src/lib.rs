//! The training program run by every rank of a data-parallel CIFAR-10 job.

pub mod config;
pub mod error;
pub mod session;

use collective::{TcpCommunicator, WorldConfig};
use log::info;
use machine_learning::{
    arch::alexnet,
    dataset::cifar10::{self, Split},
};

pub use config::{Args, Device, TrainOptions};
pub use error::{Result, WorkerErr};
pub use session::{EpochReport, Session};

/// Joins the world described by the environment and trains AlexNet on CIFAR-10.
///
/// # Arguments
/// * `args` - The parsed command line.
///
/// # Returns
/// The metrics of every epoch.
pub async fn run(args: Args) -> Result<Vec<EpochReport>> {
    args.validate()?;
    configure_threads(args.num_threads)?;

    let world = WorldConfig::from_env()?;
    let mut comm = collective::init(&world).await?;
    info!("I am worker {} of {}", comm.rank(), comm.size());

    if comm.is_root() {
        info!(
            "thread setup: {} compute threads",
            rayon::current_num_threads()
        );
    }

    if args.download {
        fetch_dataset(&mut comm, &args).await?;
    }

    let train_set = cifar10::load(&args.data_dir, Split::Train)?;
    let test_set = cifar10::load(&args.data_dir, Split::Test)?;
    let model = alexnet(cifar10::CLASSES.len(), args.hidden, args.seed)?;

    let session = Session::new(comm, model, train_set, test_set, args.train_options()).await?;
    session.run().await
}

/// Downloads CIFAR-10 once per host, the other ranks of the host wait for it.
async fn fetch_dataset(comm: &mut TcpCommunicator, args: &Args) -> Result<()> {
    if comm.local_rank() == 0 {
        let root = args.data_dir.clone();
        tokio::task::spawn_blocking(move || cifar10::download(&root, cifar10::ARCHIVE_URL))
            .await
            .map_err(|e| WorkerErr::Io(std::io::Error::other(e)))??;
    }

    comm.barrier().await?;
    Ok(())
}

/// Sizes the global compute pool, `0` keeps rayon's default of one thread per core.
fn configure_threads(num_threads: usize) -> Result<()> {
    if num_threads == 0 {
        return Ok(());
    }

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(|e| WorkerErr::Config(format!("failed to size the thread pool: {e}")))
}
