mod args;

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use tracing::info;
use vitals_relay::{logging, relay::RelayServer};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = run().await {
        eprintln!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level)?;

    let server = RelayServer::bind(&args.listen_addr)
        .await
        .with_context(|| format!("failed to listen on {}", args.listen_addr))?;

    tokio::select! {
        result = server.run() => result.context("relay stopped")?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    Ok(())
}
