use std::{net::SocketAddr, time::Duration};

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg},
};
use log::{debug, info};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    time,
};

use crate::{CollectiveErr, Communicator, Result, TcpCommunicator, WorldConfig};

const CONNECT_ATTEMPTS: u32 = 40;
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Joins the ring described by `config`.
///
/// Every rank listens on its own address, connects to its right neighbour and accepts its left
/// one. Both happen concurrently since neighbours start in no particular order. Once linked, each
/// rank greets its right neighbour with its rank and checks the greeting from its left.
///
/// # Arguments
/// * `config` - The world this process is part of.
///
/// # Returns
/// A connected communicator, or an error if the ring could not be formed.
pub async fn init(config: &WorldConfig) -> Result<TcpCommunicator> {
    config.validate()?;

    if config.size == 1 {
        info!("single rank world, collectives are local no-ops");
        return Ok(Communicator::solo(config.local_rank));
    }

    let addr = config.peers[config.rank];
    let listener = TcpListener::bind(addr).await?;
    info!(rank = config.rank; "listening at {addr}");

    let (left_stream, right_stream) = tokio::try_join!(
        accept_left(&listener),
        connect_right(config.peers[config.right()])
    )?;

    let (rx, tx) = left_stream.into_split();
    let (mut left, _) = comms::channel(rx, tx);

    let (rx, tx) = right_stream.into_split();
    let (_, mut right) = comms::channel(rx, tx);

    handshake(config, &mut left, &mut right).await?;
    info!(
        rank = config.rank,
        left = config.left(),
        right = config.right();
        "joined ring of {} ranks",
        config.size
    );

    Ok(Communicator::new(
        config.rank,
        config.size,
        config.local_rank,
        left,
        right,
    ))
}

async fn accept_left(listener: &TcpListener) -> std::io::Result<TcpStream> {
    let (stream, addr) = listener.accept().await?;
    stream.set_nodelay(true)?;
    debug!("left neighbour connected from {addr}");
    Ok(stream)
}

async fn connect_right(addr: SocketAddr) -> std::io::Result<TcpStream> {
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 0;

    loop {
        attempt += 1;

        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                debug!(attempt = attempt; "connected to right neighbour at {addr}");
                return Ok(stream);
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                debug!(attempt = attempt; "right neighbour at {addr} not ready: {e}");
                time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) => return Err(e),
        }
    }
}

async fn handshake<R, W>(
    config: &WorldConfig,
    left: &mut OnoReceiver<R>,
    right: &mut OnoSender<W>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let hello = Msg::Control(Command::Hello { rank: config.rank });
    let (sent, received) = tokio::join!(right.send(&hello), left.recv::<Msg>());
    sent?;

    let expected = config.left();
    match received? {
        Msg::Control(Command::Hello { rank }) if rank == expected => Ok(()),
        Msg::Control(Command::Hello { rank }) => Err(CollectiveErr::Handshake {
            expected,
            got: rank,
        }),
        Msg::Err(detail) => Err(CollectiveErr::Remote(detail.into_owned())),
        other => Err(CollectiveErr::UnexpectedMessage {
            op: "handshake",
            got: other.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use tokio::io;

    use super::*;

    fn middle_of_three() -> WorldConfig {
        WorldConfig {
            rank: 1,
            size: 3,
            local_rank: 1,
            peers: Vec::new(),
        }
    }

    async fn greet(config: &WorldConfig, from: Msg<'_>) -> Result<()> {
        let (ours, theirs) = io::duplex(1 << 10);

        let (rx, tx) = io::split(theirs);
        let (_, mut peer) = comms::channel(rx, tx);
        peer.send(&from).await.unwrap();

        let (rx, tx) = io::split(ours);
        let (mut left, mut right) = comms::channel(rx, tx);
        handshake(config, &mut left, &mut right).await
    }

    #[tokio::test]
    async fn greeting_from_the_left_rank_is_accepted() {
        let config = middle_of_three();
        greet(&config, Msg::Control(Command::Hello { rank: 0 }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn greeting_from_another_rank_is_rejected() {
        let config = middle_of_three();
        let err = greet(&config, Msg::Control(Command::Hello { rank: 2 }))
            .await
            .unwrap_err();

        assert!(
            matches!(err, CollectiveErr::Handshake { expected: 0, got: 2 }),
            "{err}"
        );
    }

    #[tokio::test]
    async fn remote_error_during_greeting_is_reported() {
        let config = middle_of_three();
        let err = greet(&config, Msg::Err("port taken".into()))
            .await
            .unwrap_err();

        assert!(matches!(err, CollectiveErr::Remote(ref detail) if detail == "port taken"));
    }
}
