mod args;
mod ble;

use std::{process::ExitCode, time::Duration};

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::{error, info};
use vitals_relay::{
    catalog::DeviceCatalog,
    logging,
    measurement::MeasurementRecord,
    session::{ConnectionStatus, Dispatch, SessionBinding},
    transport::{RelayTransport as _, SocketRelayTransport},
};

use crate::ble::BtleplugLink;

type Binding = SessionBinding<SocketRelayTransport, BtleplugLink>;

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

    let mut binding = Binding::new(DeviceCatalog::builtin());
    if let Err(err) = start(&args, &mut binding).await {
        error!("{err:#}");
        eprintln!("press Enter to retry");
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = binding.next_event() => {
                if let Dispatch::Appended { service_key } = binding.dispatch(event)
                    && let Some(record) = binding.local().and_then(|l| l.latest(&service_key))
                {
                    print_record(record)?;
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line.context("failed to read stdin")? {
                    Some(_) if binding.status() != ConnectionStatus::Connected => {
                        if let Err(err) = retry(&args, &mut binding).await {
                            error!("{err:#}");
                            eprintln!("press Enter to retry");
                        }
                    }
                    Some(_) => {}
                    None => stdin_open = false,
                }
            }
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
        }
    }

    binding.unbind().await;

    Ok(())
}

async fn start(args: &Args, binding: &mut Binding) -> Result<()> {
    let link = BtleplugLink::new(
        args.device_address,
        Duration::from_secs(args.scan_timeout_secs),
    )
    .await
    .context("failed to open Bluetooth adapter")?;

    let transport = SocketRelayTransport::connect(&args.relay_addr)
        .await
        .with_context(|| format!("failed to connect to relay {}", args.relay_addr))?;

    binding
        .bind_measuring(args.room.clone(), link, transport)
        .await
        .with_context(|| format!("failed to start measuring in room {}", args.room))
}

/// Re-attempts the device connection, or starts over when the relay
/// connection itself is gone.
async fn retry(args: &Args, binding: &mut Binding) -> Result<()> {
    match binding.transport().map(|t| t.is_open()) {
        Some(true) => binding
            .retry()
            .await
            .context("failed to reconnect device"),
        _ => start(args, binding).await,
    }
}

fn print_record(record: &MeasurementRecord) -> Result<()> {
    let line = serde_json::to_string(record).context("failed to serialize record")?;
    println!("{line}");
    Ok(())
}
