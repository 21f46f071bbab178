use std::ops::Range;

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload},
};
use half::f16;
use log::{debug, trace};
use tokio::{
    io::{self, AsyncRead, AsyncWrite, DuplexStream, ReadHalf, WriteHalf},
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
};

use crate::{CollectiveErr, Compression, Result};

/// A communicator linked through TCP sockets.
pub type TcpCommunicator = Communicator<OwnedReadHalf, OwnedWriteHalf>;

/// A communicator linked through in-memory pipes, see `Communicator::local_ring`.
pub type LocalCommunicator = Communicator<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// How the values of every rank are combined by an all-reduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Average,
}

#[derive(Clone, Copy)]
enum Apply {
    Add,
    Overwrite,
}

/// The ring links of a rank.
struct Link<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    left: OnoReceiver<R>,
    right: OnoSender<W>,
    rx_buf: Vec<u32>,
    tx_half: Vec<f16>,
}

/// A participant of a training job.
///
/// Every collective call must be issued by all ranks, in the same order and with buffers of the
/// same length, otherwise the ring stalls or fails with a `LengthMismatch`.
pub struct Communicator<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    rank: usize,
    size: usize,
    local_rank: usize,
    link: Option<Link<R, W>>,
}

impl<R, W> Communicator<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a new `Communicator` from already connected ring links.
    ///
    /// # Arguments
    /// * `rank` - The rank of this process.
    /// * `size` - The amount of ranks in the ring.
    /// * `local_rank` - The rank of this process within its host.
    /// * `left` - Receiving end from `rank - 1`.
    /// * `right` - Sending end to `rank + 1`.
    pub fn new(
        rank: usize,
        size: usize,
        local_rank: usize,
        left: OnoReceiver<R>,
        right: OnoSender<W>,
    ) -> Self {
        let link = Link {
            left,
            right,
            rx_buf: Vec::new(),
            tx_half: Vec::new(),
        };

        Self {
            rank,
            size,
            local_rank,
            link: Some(link),
        }
    }

    /// Creates the communicator of a world with a single rank, every collective is a no-op.
    pub fn solo(local_rank: usize) -> Self {
        Self {
            rank: 0,
            size: 1,
            local_rank,
            link: None,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn local_rank(&self) -> usize {
        self.local_rank
    }

    /// Returns `true` for rank 0, the rank that reports results.
    pub fn is_root(&self) -> bool {
        self.rank == 0
    }

    /// All-reduces `data` in place, in full precision.
    pub async fn allreduce(&mut self, data: &mut [f32], op: ReduceOp) -> Result<()> {
        self.allreduce_with(data, op, Compression::None).await
    }

    /// All-reduces `data` in place using the ring algorithm.
    ///
    /// The buffer is cut in `size` chunks. During the scatter-reduce phase every rank sends one
    /// chunk to its right and adds the one coming from its left, after `size - 1` steps each rank
    /// holds one fully reduced chunk. The all-gather phase then circulates those chunks for
    /// another `size - 1` steps.
    ///
    /// # Arguments
    /// * `data` - The local contribution, replaced by the reduced result.
    /// * `op` - How values are combined.
    /// * `compression` - How chunks are encoded on the wire.
    ///
    /// # Returns
    /// An error on I/O failures or when a peer sends something unexpected.
    pub async fn allreduce_with(
        &mut self,
        data: &mut [f32],
        op: ReduceOp,
        compression: Compression,
    ) -> Result<()> {
        let (rank, size) = (self.rank, self.size);
        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };

        let len = data.len();
        trace!(rank = rank, len = len; "all-reduce started");
        compression.round_trip(data);

        for step in 0..size - 1 {
            let send = chunk_range(len, (rank + size - step) % size, size);
            let recv = chunk_range(len, (rank + 2 * size - step - 1) % size, size);
            link.exchange("all-reduce", data, send, recv, compression, Apply::Add)
                .await?;
        }

        // The owned chunk is the only one this rank reduced itself, round it the same way the
        // other ranks will see it.
        let owned = chunk_range(len, (rank + 1) % size, size);
        compression.round_trip(&mut data[owned]);

        for step in 0..size - 1 {
            let send = chunk_range(len, (rank + 1 + size - step) % size, size);
            let recv = chunk_range(len, (rank + size - step) % size, size);
            link.exchange("all-gather", data, send, recv, compression, Apply::Overwrite)
                .await?;
        }

        if let ReduceOp::Average = op {
            let n = size as f32;
            data.iter_mut().for_each(|x| *x /= n);
        }

        Ok(())
    }

    /// Copies `root`'s buffer into every other rank's `data`.
    ///
    /// The buffer travels along the ring starting at `root`, each rank forwarding it to its
    /// right until it reaches the rank just before `root`.
    pub async fn broadcast(&mut self, data: &mut [f32], root: usize) -> Result<()> {
        let (rank, size) = (self.rank, self.size);
        if root >= size {
            return Err(CollectiveErr::InvalidRoot { root, size });
        }

        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };

        if rank != root {
            let msg: Msg = link.left.recv_into(&mut link.rx_buf).await?;
            match msg {
                Msg::Data(Payload::Chunk(nums)) => {
                    if nums.len() != data.len() {
                        return Err(CollectiveErr::LengthMismatch {
                            op: "broadcast",
                            got: nums.len(),
                            expected: data.len(),
                        });
                    }

                    data.copy_from_slice(nums);
                }
                other => return Err(unexpected("broadcast", other)),
            }
        }

        if (rank + 1) % size != root {
            let chunk: &[f32] = data;
            link.right.send(&Msg::Data(Payload::Chunk(chunk))).await?;
        }

        debug!(rank = rank, root = root, len = data.len(); "broadcast done");
        Ok(())
    }

    /// Averages a scalar over all ranks.
    ///
    /// # Arguments
    /// * `value` - This rank's value.
    /// * `name` - The metric's name, only used for logging.
    pub async fn metric_average(&mut self, value: f32, name: &str) -> Result<f32> {
        let mut buf = [value];
        self.allreduce(&mut buf, ReduceOp::Average).await?;

        debug!(rank = self.rank, metric = name; "local {value} averaged to {}", buf[0]);
        Ok(buf[0])
    }

    /// Waits until every rank has reached this call.
    pub async fn barrier(&mut self) -> Result<()> {
        let mut token = [0.0];
        self.allreduce(&mut token, ReduceOp::Sum).await
    }

    /// Tells the right neighbour this rank is done and waits for the left one to do the same.
    pub async fn shutdown(self) -> Result<()> {
        let Some(mut link) = self.link else {
            return Ok(());
        };

        let bye = Msg::Control(Command::Disconnect);
        let (sent, received) = tokio::join!(
            link.right.send(&bye),
            link.left.recv_into::<Msg, _>(&mut link.rx_buf)
        );

        sent?;
        match received? {
            Msg::Control(Command::Disconnect) => {}
            other => return Err(unexpected("shutdown", other)),
        }

        link.right.shutdown().await?;
        debug!(rank = self.rank; "left the ring");
        Ok(())
    }
}

impl LocalCommunicator {
    /// Builds `size` communicators wired as a ring through in-memory pipes.
    ///
    /// # Arguments
    /// * `size` - The amount of ranks.
    /// * `max_buf_size` - The capacity of every pipe, in bytes.
    ///
    /// # Returns
    /// The communicators, indexed by rank.
    pub fn local_ring(size: usize, max_buf_size: usize) -> Vec<Self> {
        if size <= 1 {
            return vec![Self::solo(0)];
        }

        let mut rights = Vec::with_capacity(size);
        let mut lefts = Vec::with_capacity(size);

        // Pipe `i` goes from rank `i` to rank `i + 1`.
        for _ in 0..size {
            let (a, b) = io::duplex(max_buf_size);
            let (a_rx, a_tx) = io::split(a);
            let (b_rx, b_tx) = io::split(b);
            let (_, right) = comms::channel(a_rx, a_tx);
            let (left, _) = comms::channel(b_rx, b_tx);
            rights.push(right);
            lefts.push(left);
        }

        // Rank `i` reads from pipe `i - 1`.
        lefts.rotate_right(1);

        lefts
            .into_iter()
            .zip(rights)
            .enumerate()
            .map(|(rank, (left, right))| Self::new(rank, size, rank, left, right))
            .collect()
    }
}

impl<R, W> Link<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Sends `data[send]` to the right while receiving into `data[recv]` from the left.
    ///
    /// Both directions progress concurrently, a rank that only wrote first could block forever
    /// once every pipe in the ring is full.
    async fn exchange(
        &mut self,
        op: &'static str,
        data: &mut [f32],
        send: Range<usize>,
        recv: Range<usize>,
        compression: Compression,
        apply: Apply,
    ) -> Result<()> {
        let Self {
            left,
            right,
            rx_buf,
            tx_half,
        } = self;

        let outgoing = match compression {
            Compression::None => Msg::Data(Payload::Chunk(&data[send])),
            Compression::Fp16 => {
                Compression::encode(&data[send], tx_half);
                Msg::Data(Payload::HalfChunk(tx_half))
            }
        };

        let (sent, received) = tokio::join!(
            right.send(&outgoing),
            left.recv_into::<Msg, _>(rx_buf)
        );
        drop(outgoing);

        sent?;
        let dst = &mut data[recv];

        match received? {
            Msg::Data(Payload::Chunk(nums)) => apply_chunk(op, apply, dst, nums.iter().copied()),
            Msg::Data(Payload::HalfChunk(nums)) => {
                apply_chunk(op, apply, dst, nums.iter().map(|x| x.to_f32()))
            }
            other => Err(unexpected(op, other)),
        }
    }
}

fn apply_chunk<I>(op: &'static str, apply: Apply, dst: &mut [f32], src: I) -> Result<()>
where
    I: ExactSizeIterator<Item = f32>,
{
    if src.len() != dst.len() {
        return Err(CollectiveErr::LengthMismatch {
            op,
            got: src.len(),
            expected: dst.len(),
        });
    }

    match apply {
        Apply::Add => dst.iter_mut().zip(src).for_each(|(d, s)| *d += s),
        Apply::Overwrite => dst.iter_mut().zip(src).for_each(|(d, s)| *d = s),
    }

    Ok(())
}

fn unexpected(op: &'static str, msg: Msg<'_>) -> CollectiveErr {
    match msg {
        Msg::Err(detail) => CollectiveErr::Remote(detail.into_owned()),
        other => CollectiveErr::UnexpectedMessage {
            op,
            got: other.kind(),
        },
    }
}

/// Splits `len` values in `parts` contiguous chunks and returns the `idx`-th one.
///
/// Chunk sizes differ by at most one, the first `len % parts` chunks being the larger ones.
fn chunk_range(len: usize, idx: usize, parts: usize) -> Range<usize> {
    let base = len / parts;
    let rem = len % parts;

    let start = idx * base + idx.min(rem);
    let extra = if idx < rem { 1 } else { 0 };
    start..start + base + extra
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ranges_are_balanced_and_cover_everything() {
        assert_eq!(chunk_range(10, 0, 3), 0..4);
        assert_eq!(chunk_range(10, 1, 3), 4..7);
        assert_eq!(chunk_range(10, 2, 3), 7..10);
    }

    #[test]
    fn chunk_ranges_can_be_empty() {
        assert_eq!(chunk_range(2, 0, 4), 0..1);
        assert_eq!(chunk_range(2, 1, 4), 1..2);
        assert_eq!(chunk_range(2, 2, 4), 2..2);
        assert_eq!(chunk_range(2, 3, 4), 2..2);
    }

    #[tokio::test]
    async fn solo_collectives_are_noops() {
        let mut comm = LocalCommunicator::solo(0);
        let mut data = [1.0, 2.0, 3.0];

        comm.allreduce(&mut data, ReduceOp::Average).await.unwrap();
        comm.broadcast(&mut data, 0).await.unwrap();
        assert_eq!(data, [1.0, 2.0, 3.0]);

        assert_eq!(comm.metric_average(0.25, "loss").await.unwrap(), 0.25);
        assert!(comm.is_root());
        comm.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn broadcast_rejects_out_of_range_root() {
        let mut comm = LocalCommunicator::solo(0);
        let err = comm.broadcast(&mut [1.0], 1).await.unwrap_err();
        assert!(matches!(err, CollectiveErr::InvalidRoot { root: 1, size: 1 }));
    }
}
