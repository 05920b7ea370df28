mod args;

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use args::Args;
use chrono_tz::Tz;
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

type Binding = SessionBinding<SocketRelayTransport>;

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

    let catalog = DeviceCatalog::builtin();
    let mut binding = Binding::new(catalog);
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
                    && let Some(remote) = binding.remote()
                    && let Some(record) = remote.latest(&service_key)
                {
                    let label = catalog
                        .resolve(&service_key)
                        .map_or(service_key.as_str(), |d| d.label);
                    let count = remote.history(&service_key).len();
                    print_record(label, count, record, args.timezone);
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
    let transport = SocketRelayTransport::connect(&args.relay_addr)
        .await
        .with_context(|| format!("failed to connect to relay {}", args.relay_addr))?;

    binding
        .bind_observing(args.room.clone(), transport)
        .await
        .with_context(|| format!("failed to observe room {}", args.room))
}

async fn retry(args: &Args, binding: &mut Binding) -> Result<()> {
    match binding.transport().map(|t| t.is_open()) {
        Some(true) => binding.retry().await.context("failed to rejoin room"),
        _ => start(args, binding).await,
    }
}

fn print_record(label: &str, count: usize, record: &MeasurementRecord, timezone: Tz) {
    let fields = record
        .fields()
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ");

    println!(
        "{} {label} #{count} from {}: {fields}",
        record.timestamp().with_timezone(&timezone).format("%Y-%m-%d %H:%M:%S %Z"),
        record.device_name(),
    );
}
