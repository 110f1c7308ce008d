//! relay-plane daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   config file ──▶ loader ──▶ Relay::reconcile ──▶ Admin / Auth / Listener / Cluster
//!        │                           ▲                         │          │
//!        ▼                           │                         ▼          ▼
//!   ConfigWatcher ───────────────────┘                  server sockets  ResolverService
//!   (and SIGHUP)                                               │          │
//!                                                              ▼          ▼
//!   protocol engine ◀── AuthHandler / PermissionHandler / RelayAddressGenerator
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use relay_plane::config::loader::load_config;
use relay_plane::config::watcher::ConfigWatcher;
use relay_plane::lifecycle::{startup, SignalEvent, Signals};
use relay_plane::net::SystemNet;
use relay_plane::observability::LoggerFactory;
use relay_plane::resolver::{DnsResolver, ResolverService};
use relay_plane::{Relay, RelayConfig, Shutdown};

#[derive(Parser)]
#[command(name = "relay-plane")]
#[command(version, about = "STUN/TURN relay control plane", long_about = None)]
struct Cli {
    /// Configuration file (YAML, JSON or TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Reconcile automatically when the configuration file changes
    #[arg(short, long)]
    watch: bool,

    /// Log filter overriding admin.logLevel (e.g. "debug")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Seconds between background DNS refreshes of domain clusters
    #[arg(long, default_value_t = 5)]
    resolve_interval: u64,
}

impl Cli {
    fn apply_overrides(&self, config: &mut RelayConfig) {
        if let Some(level) = &self.log_level {
            config.admin.log_level = level.clone();
        }
    }
}

async fn next_update(rx: &mut Option<mpsc::UnboundedReceiver<RelayConfig>>) -> Option<RelayConfig> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn apply(relay: &Relay, config: RelayConfig) {
    match relay.reconcile(config) {
        Ok(report) if report.restart_required() => {
            if let Err(e) = relay.restart().await {
                tracing::error!(error = %e, "Failed to restart listeners");
            }
        }
        Ok(report) => {
            tracing::debug!(noop = report.is_noop(), "Configuration applied in place");
        }
        Err(e) => {
            tracing::error!(error = %e, "Configuration rejected, keeping last applied configuration");
        }
    }
    log_status(relay);
}

fn log_status(relay: &Relay) {
    match serde_json::to_string(&relay.status()) {
        Ok(status) => tracing::info!(%status, "Relay status"),
        Err(e) => tracing::warn!(error = %e, "Failed to render relay status"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    cli.apply_overrides(&mut config);
    let logger = LoggerFactory::init(&config.admin.log_level)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        listeners = config.listeners.len(),
        clusters = config.clusters.len(),
        "relay-plane starting"
    );

    let shutdown = Shutdown::new();
    let resolver = ResolverService::new(
        Arc::new(DnsResolver::new()),
        Duration::from_secs(cli.resolve_interval.max(1)),
    );
    let runtime = startup::start(config, Arc::new(SystemNet), resolver, logger, &shutdown).await?;
    let relay = runtime.relay;
    log_status(&relay);

    let (_watcher, mut updates) = if cli.watch {
        let (watcher, rx) = ConfigWatcher::new(&cli.config);
        (Some(watcher.run()?), Some(rx))
    } else {
        (None, None)
    };

    let mut signals = Signals::new()?;
    loop {
        tokio::select! {
            Some(mut config) = next_update(&mut updates) => {
                cli.apply_overrides(&mut config);
                apply(&relay, config).await;
            }
            event = signals.recv() => match event {
                SignalEvent::Shutdown => break,
                SignalEvent::Reload => match load_config(&cli.config) {
                    Ok(mut config) => {
                        cli.apply_overrides(&mut config);
                        apply(&relay, config).await;
                    }
                    Err(e) => tracing::error!(error = %e, "Reload failed, keeping current configuration"),
                },
            },
        }
    }

    tracing::info!("Shutting down");
    shutdown.trigger();
    relay.stop();
    relay.close();
    if let Err(e) = runtime.resolver_task.await {
        tracing::warn!(error = %e, "Resolver task ended abnormally");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
