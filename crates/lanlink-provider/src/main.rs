//! LanLink daemon entry point.
//!
//! Loads the configuration, starts the LAN link provider through a
//! [`LinkProviderRegistry`], and keeps it informed about network changes
//! until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! lanlink [OPTIONS]
//!
//! Options:
//!   --config <PATH>        Config file [default: platform config dir]
//!   --name <NAME>          Device name announced to peers
//!   --log-level <LEVEL>    Log level when RUST_LOG is unset
//!   --poll-interval <SECS> Seconds between network checks [default: 5]
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  ├─ load / create config (device id generated on first run)
//!  ├─ LanLinkProvider::new()  -- spawns the provider event loop
//!  ├─ registry.start_all()
//!  ├─ link event pump          (logs established / lost links)
//!  └─ poll loop                (notify_network_change every N seconds)
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lanlink_provider::infrastructure::network::interfaces;
use lanlink_provider::infrastructure::storage::config::{
    config_file_path, load_from_path, save_to_path,
};
use lanlink_provider::{LanLinkProvider, LinkEvent, LinkProviderRegistry};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LanLink: keeps one TCP link open to every peer device on the LAN.
#[derive(Debug, Parser)]
#[command(name = "lanlink", version)]
struct Cli {
    /// Path of the TOML config file.
    #[arg(long, env = "LANLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Device name announced to peers (overrides the config file).
    #[arg(long, env = "LANLINK_NAME")]
    name: Option<String>,

    /// `tracing` level used when `RUST_LOG` is unset (overrides the config
    /// file).
    #[arg(long, env = "LANLINK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Seconds between local network checks.
    #[arg(long, default_value_t = 5, env = "LANLINK_POLL_INTERVAL")]
    poll_interval: u64,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path().context("no config path given and no platform default")?,
    };
    let mut config = load_from_path(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.device.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    if config.ensure_device_id() {
        info!("generated device id {}", config.device.id);
        if let Err(e) = save_to_path(&config, &config_path) {
            warn!("could not persist the new device id: {e}");
        }
    }
    if let Some(name) = cli.name {
        config.device.name = name;
    }

    let provider_config = config
        .to_provider_config()
        .with_context(|| format!("invalid config in {}", config_path.display()))?;
    info!(
        "LanLink starting as {} ({})",
        provider_config.local.device_name, provider_config.local.device_id
    );

    let (provider, mut link_events) = LanLinkProvider::new(provider_config);
    let mut registry = LinkProviderRegistry::new();
    registry.register(Box::new(provider.clone()));

    let failures = registry.start_all().await;
    if failures.len() == registry.len() {
        anyhow::bail!("no link provider could start: {failures:?}");
    }

    // ── Link event pump ───────────────────────────────────────────────────────
    tokio::spawn(async move {
        while let Some(event) = link_events.recv().await {
            match event {
                LinkEvent::Established { peer, transport } => {
                    info!(
                        "linked to {peer} ({}, {}) at {}",
                        transport.identity.device_name,
                        transport.identity.device_type,
                        transport.remote_addr
                    );
                    // No consumers are attached in the daemon; drain so the
                    // link keeps reading.
                    let mut inbound = transport.inbound;
                    tokio::spawn(async move { while inbound.recv().await.is_some() {} });
                }
                LinkEvent::Lost { peer } => info!("link to {peer} lost"),
            }
        }
    });

    // ── Network poll loop ─────────────────────────────────────────────────────
    let mut poll = tokio::time::interval(Duration::from_secs(cli.poll_interval.max(1)));
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("LanLink ready.  Press Ctrl-C to exit.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            _ = poll.tick() => {
                let snapshot = interfaces::current_snapshot().await;
                registry.notify_network_change(&snapshot).await;
            }
        }
    }

    registry.stop_all().await;
    info!("LanLink stopped");
    Ok(())
}
