//! Framed messages for the links of a ring.
//!
//! Every frame is a big-endian `u64` body length followed by the body. Numeric chunks travel
//! as raw bytes and are read back into 4-byte aligned buffers, so a rank can reduce a
//! neighbour's chunk in place without copying it.

mod align;
mod deserialize;
pub mod msg;
mod receiver;
mod sender;
mod serialize;

use tokio::io::{AsyncRead, AsyncWrite};

pub use align::Align4;
pub use deserialize::Deserialize;
pub use receiver::OnoReceiver;
pub use sender::OnoSender;
pub use serialize::Serialize;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// The largest frame body a receiver accepts unless told otherwise, 1 GiB.
pub const MAX_FRAME_LEN: usize = 1 << 30;

/// Wraps the two halves of a ring link.
///
/// On a ring the reader is the stream coming from the left neighbour and the writer the one
/// going to the right neighbour, they need not belong to the same socket.
///
/// # Arguments
/// * `rx` - The stream frames are read from.
/// * `tx` - The stream frames are written to.
///
/// # Returns
/// The receiving and sending ends of the link.
pub fn channel<R, W>(rx: R, tx: W) -> (OnoReceiver<R>, OnoSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (OnoReceiver::new(rx), OnoSender::new(tx))
}
