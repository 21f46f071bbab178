use std::net::{SocketAddr, TcpListener};

use collective::{CollectiveErr, ReduceOp, WorldConfig, init};

/// Reserves `n` free local ports.
fn free_addrs(n: usize) -> Vec<SocketAddr> {
    let listeners: Vec<_> = (0..n)
        .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();

    listeners.iter().map(|l| l.local_addr().unwrap()).collect()
}

#[tokio::test]
async fn ranks_rendezvous_and_reduce_over_tcp() {
    const SIZE: usize = 3;
    let peers = free_addrs(SIZE);

    let handles: Vec<_> = (0..SIZE)
        .map(|rank| {
            let config = WorldConfig {
                rank,
                size: SIZE,
                local_rank: rank,
                peers: peers.clone(),
            };

            tokio::spawn(async move {
                let mut comm = init(&config).await.unwrap();
                assert_eq!(comm.rank(), rank);
                assert_eq!(comm.size(), SIZE);

                let mut data = vec![rank as f32 + 1.0; 1000];
                comm.allreduce(&mut data, ReduceOp::Sum).await.unwrap();
                comm.shutdown().await.unwrap();
                data
            })
        })
        .collect();

    for handle in handles {
        let data = handle.await.unwrap();
        assert!(data.iter().all(|&x| x == 6.0));
    }
}

#[tokio::test]
async fn single_rank_world_needs_no_network() {
    let mut comm = init(&WorldConfig::solo()).await.unwrap();
    let mut data = vec![2.0; 4];

    comm.allreduce(&mut data, ReduceOp::Average).await.unwrap();
    assert_eq!(data, vec![2.0; 4]);
    assert!(comm.is_root());
    comm.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_world_is_rejected() {
    let config = WorldConfig {
        rank: 0,
        size: 2,
        local_rank: 0,
        peers: free_addrs(1),
    };

    assert!(matches!(init(&config).await, Err(CollectiveErr::Config(_))));
}
