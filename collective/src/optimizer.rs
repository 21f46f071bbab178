use log::debug;
use machine_learning::optimization::Optimizer;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{Communicator, Compression, ReduceOp, Result};

/// Wraps an optimizer so that every step first averages the gradient over all ranks.
///
/// Since every replica starts from the same parameters and applies the same averaged gradient,
/// replicas stay identical for the whole training.
pub struct DistributedOptimizer<O: Optimizer> {
    inner: O,
    compression: Compression,
}

impl<O: Optimizer> DistributedOptimizer<O> {
    /// Creates a new `DistributedOptimizer`.
    ///
    /// # Arguments
    /// * `inner` - The local optimization algorithm.
    /// * `compression` - The wire encoding used for the gradient all-reduce.
    pub fn new(inner: O, compression: Compression) -> Self {
        Self { inner, compression }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    /// Averages `grad` over all ranks and applies it to `params`.
    ///
    /// # Arguments
    /// * `comm` - This rank's communicator.
    /// * `grad` - The local gradient, replaced by the averaged one.
    /// * `params` - The parameters to update.
    pub async fn step<R, W>(
        &mut self,
        comm: &mut Communicator<R, W>,
        grad: &mut [f32],
        params: &mut [f32],
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        comm.allreduce_with(grad, ReduceOp::Average, self.compression)
            .await?;
        self.inner.update_params(grad, params)?;
        Ok(())
    }
}

/// Makes every rank start from `root`'s parameters.
pub async fn broadcast_parameters<R, W>(
    comm: &mut Communicator<R, W>,
    params: &mut [f32],
    root: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    comm.broadcast(params, root).await?;
    debug!(rank = comm.rank(); "parameters synchronized from rank {root}");
    Ok(())
}

/// Makes every rank's optimizer state equal to `root`'s.
///
/// Stateless optimizers have nothing to send, all ranks skip the broadcast alike.
pub async fn broadcast_optimizer_state<R, W, O>(
    comm: &mut Communicator<R, W>,
    optimizer: &mut O,
    root: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    O: Optimizer,
{
    let state = optimizer.state_mut();
    if state.is_empty() {
        return Ok(());
    }

    comm.broadcast(state, root).await?;
    debug!(rank = comm.rank(); "optimizer state synchronized from rank {root}");
    Ok(())
}
