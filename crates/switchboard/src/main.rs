//! `switchboard` daemon: loads configuration, registers the static
//! collaborators and runs the session coordinator until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use switchboard::infra_common::{log_welcome, parse_log_level, setup_logging, LoggingConfig, SwitchboardConfig};
use switchboard::registry_from_config;
use switchboard::session_core::{CoordinatorEvent, SessionCoordinator};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(about = "SIP call-control and media relay daemon", version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = SwitchboardConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    let mut logging = LoggingConfig::from_section(&config.logging, "switchboard")?;
    if let Some(level) = &args.log_level {
        logging.level = parse_log_level(level)?;
    }
    if args.json_logs {
        logging = logging.with_json();
    }
    setup_logging(logging)?;
    log_welcome("switchboard", switchboard::VERSION);

    let registry = registry_from_config(&config.collaborators);
    if registry.is_empty() {
        warn!("no collaborators configured; every call will be refused");
    }

    let coordinator = SessionCoordinator::new(config, registry)
        .await
        .context("failed to start the session coordinator")?;
    info!(addr = %coordinator.local_addr(), "listening for SIP");

    let mut events = coordinator.subscribe();
    let mut records = coordinator.subscribe_records();
    let run = coordinator.start();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CoordinatorEvent::StateChanged { call_id, state }) => {
                    debug!(%call_id, %state, "call state changed")
                }
                Ok(event) => debug!(call_id = %event.call_id(), ?event, "coordinator event"),
                Err(RecvError::Lagged(missed)) => warn!(missed, "event subscriber lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
    tokio::spawn(async move {
        loop {
            match records.recv().await {
                Ok(record) => info!(
                    call_id = %record.call_id,
                    destination = %record.destination,
                    reason = ?record.end_reason,
                    legs = record.quality.len(),
                    "call record"
                ),
                Err(RecvError::Lagged(missed)) => warn!(missed, "record subscriber lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!(calls = coordinator.call_count(), "shutting down");
    coordinator.shutdown().await;
    if let Err(e) = run.await {
        warn!(error = %e, "coordinator task ended abnormally");
    }
    info!("switchboard stopped");
    Ok(())
}
