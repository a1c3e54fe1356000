//! VPP agent entry point.
//!
//! Loads the agent settings and a desired-state snapshot, reconciles the
//! dataplane with it and then serves changes until interrupted.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vpp_agent::audit::{init_logging, init_logging_pretty};
use vpp_agent::interfaces::LogStatePublisher;
use vpp_agent::{AgentConfig, DesiredState, VppAgent};
use vpp_dataplane::types::DataplaneNotification;
use vpp_dataplane::InMemoryDataplane;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
    Pretty,
}

/// VPP control-plane agent
#[derive(Parser, Debug)]
#[command(name = "vpp-agent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Agent settings (YAML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Desired-state snapshot to resync at startup (YAML)
    #[arg(short = 's', long)]
    snapshot: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Overrides the default MTU from the settings file
    #[arg(long)]
    default_mtu: Option<u32>,

    /// Wait for Linux host interfaces before creating AF-Packets
    #[arg(long)]
    linux_support: bool,

    /// Notification polling interval in milliseconds
    #[arg(long, default_value = "100")]
    notification_interval: u64,
}

/// Moves dataplane notifications to the state watcher.
async fn pump_notifications(
    dataplane: Arc<InMemoryDataplane>,
    sender: mpsc::Sender<DataplaneNotification>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                for notification in dataplane.take_notifications() {
                    if sender.send(notification).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::load(path).context("failed to load agent settings")?,
        None => AgentConfig::default(),
    };
    if let Some(mtu) = args.default_mtu {
        config.default_mtu = mtu;
    }
    config.linux_support |= args.linux_support;

    let desired = match &args.snapshot {
        Some(path) => DesiredState::load(path).context("failed to load snapshot")?,
        None => DesiredState::default(),
    };

    info!("Default MTU: {}", config.default_mtu);
    info!("Linux support: {}", config.linux_support);
    info!("Resync strategy: {:?}", config.resync_strategy);

    let dataplane = Arc::new(InMemoryDataplane::new());
    let capacity = config.notification_capacity.max(1);
    let mut agent = VppAgent::new(config, dataplane.clone(), Arc::new(LogStatePublisher));

    let report = agent.resync(&desired);
    let totals = report.totals();
    info!(
        "Resync {} done: {} registered, {} configured, {} modified, {} deleted, {} pending",
        report.correlation_id,
        totals.registered,
        totals.configured,
        totals.modified,
        totals.deleted,
        totals.pending
    );
    for err in report.errors() {
        warn!("Resync error: {}", err);
    }

    let shutdown = CancellationToken::new();
    let (notification_tx, notification_rx) = mpsc::channel(capacity);
    let watcher = tokio::spawn(agent.state_updater().run(notification_rx, shutdown.clone()));
    let pump = tokio::spawn(pump_notifications(
        dataplane,
        notification_tx,
        Duration::from_millis(args.notification_interval.max(1)),
        shutdown.clone(),
    ));
    let (command_tx, command_rx) = mpsc::channel(capacity);
    let agent_task = tokio::spawn(agent.run(command_rx, shutdown.clone()));

    let signal = tokio::signal::ctrl_c().await;
    shutdown.cancel();
    drop(command_tx);
    signal.context("failed to listen for ctrl-c")?;
    warn!("Received SIGINT, shutting down gracefully...");

    let agent = agent_task.await.context("agent task failed")?;
    for line in agent.dump() {
        info!("{}", line);
    }
    pump.await.context("notification pump failed")?;
    watcher.await.context("state watcher failed")?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match args.log_format {
        LogFormat::Text => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
                .init()
        }
        LogFormat::Json => init_logging(&args.log_level),
        LogFormat::Pretty => init_logging_pretty(&args.log_level),
    }

    info!("Starting VPP agent");
    match run(args).await {
        Ok(()) => {
            info!("VPP agent shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
