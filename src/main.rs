mod bencode;
mod cli;
mod client;
mod error;
mod peer;
mod piece;
mod storage;
mod torrent;
mod tracker;

use anyhow::{anyhow, Result};
use cli::Cli;
use error::SwarmError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match Cli::parse().run().await {
        Ok(()) => Ok(()),
        Err(SwarmError::VerificationFailure(pieces)) => {
            for index in &pieces {
                eprintln!("piece {} failed integrity re-validation", index);
            }
            Err(anyhow!(
                "{} saved pieces failed integrity re-validation",
                pieces.len()
            ))
        }
        Err(e) => Err(e.into()),
    }
}
