use std::io;

use clap::Parser;
use log::error;

use worker::Args;

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = worker::run(args).await {
        error!("training failed: {e}");
        return Err(e.into());
    }

    Ok(())
}
