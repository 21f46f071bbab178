//! Launches one worker process per rank on this host, wiring them into a ring.

use std::{net::Ipv6Addr, process::ExitStatus};

use anyhow::{Context, bail};
use clap::Parser;
use collective::{LOCAL_RANK_VAR, PEERS_VAR, RANK_VAR, WORLD_SIZE_VAR};
use log::{error, info};
use tokio::{process::Command, signal, task::JoinSet};

/// Runs a training job of `--np` ranks on this host.
#[derive(Parser, Debug)]
#[command(name = "node")]
struct Args {
    /// Number of ranks to launch
    #[arg(short = 'n', long)]
    np: usize,

    /// Port of rank 0, rank `i` listens on `base_port + i`
    #[arg(long, default_value_t = 29500)]
    base_port: u16,

    /// Address every rank listens on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// The worker program followed by its arguments
    #[arg(last = true, required = true, num_args = 1..)]
    command: Vec<String>,
}

/// Lists the listening address of every rank, bracketing IPv6 hosts.
fn peers(host: &str, base_port: u16, np: usize) -> anyhow::Result<Vec<String>> {
    let host = match host.parse::<Ipv6Addr>() {
        Ok(ip) => format!("[{ip}]"),
        Err(_) => host.to_string(),
    };

    (0..np)
        .map(|rank| {
            let port = u16::try_from(rank)
                .ok()
                .and_then(|offset| base_port.checked_add(offset))
                .with_context(|| format!("no port left for rank {rank} above {base_port}"))?;

            Ok(format!("{host}:{port}"))
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.np == 0 {
        bail!("--np must be at least 1");
    }

    let peers = peers(&args.host, args.base_port, args.np)?.join(",");
    let (program, program_args) = args
        .command
        .split_first()
        .context("missing worker program")?;

    info!(np = args.np; "launching {program} with peers {peers}");

    // Dropping the set aborts the tasks, which kills the children still running.
    let mut children = JoinSet::new();
    for rank in 0..args.np {
        let mut child = Command::new(program)
            .args(program_args)
            .env(RANK_VAR, rank.to_string())
            .env(WORLD_SIZE_VAR, args.np.to_string())
            .env(LOCAL_RANK_VAR, rank.to_string())
            .env(PEERS_VAR, &peers)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn rank {rank}"))?;

        children.spawn(async move { (rank, child.wait().await) });
    }

    tokio::select! {
        ret = wait_all(&mut children) => ret,
        _ = signal::ctrl_c() => {
            info!("received SIGINT, stopping every rank");
            Ok(())
        }
    }
}

/// Waits for every rank, failing as soon as one of them does.
async fn wait_all(children: &mut JoinSet<(usize, std::io::Result<ExitStatus>)>) -> anyhow::Result<()> {
    while let Some(joined) = children.join_next().await {
        let (rank, status) = joined.context("rank supervisor panicked")?;
        let status = status.with_context(|| format!("failed to wait for rank {rank}"))?;

        if !status.success() {
            error!(rank = rank; "exited with {status}, stopping the remaining ranks");
            children.abort_all();
            bail!("rank {rank} exited with {status}");
        }

        info!(rank = rank; "finished");
    }

    Ok(())
}
