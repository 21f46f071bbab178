//! Writing frames towards the right neighbour.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, Serialize};

/// The sending end of a ring link.
pub struct OnoSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    head: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> OnoSender<W> {
    /// Creates a new `OnoSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The stream going to the right neighbour.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            head: Vec::new(),
        }
    }

    /// Writes `msg` as a single frame and flushes it.
    ///
    /// The length prefix and the message header are staged in a reused buffer, a chunk's
    /// values are written straight from the caller's slice afterwards.
    ///
    /// # Arguments
    /// * `msg` - The message to frame.
    ///
    /// # Returns
    /// An `io::Error` if the stream fails.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        let Self { head, tx } = self;

        head.clear();
        head.resize(LEN_TYPE_SIZE, 0);

        let tail = msg.serialize(head);
        let body_len = head.len() - LEN_TYPE_SIZE + tail.map_or(0, <[u8]>::len);
        head[..LEN_TYPE_SIZE].copy_from_slice(&(body_len as LenType).to_be_bytes());

        tx.write_all(head).await?;
        if let Some(tail) = tail {
            tx.write_all(tail).await?;
        }

        tx.flush().await
    }

    /// Closes the stream towards the right neighbour.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.tx.shutdown().await
    }
}
