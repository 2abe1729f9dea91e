//! Re-key request balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                  REKEY BALANCER                  │
//!   Client        │  ┌────────┐    ┌────────────┐    ┌───────────┐  │
//!   ──────────────┼─▶│  http  │───▶│ dispatcher │───▶│ upstream  │──┼──▶ Worker node
//!                 │  │ server │    └─────┬──────┘    │  client   │  │
//!                 │  └────────┘          │ reads     └───────────┘  │
//!                 │                      ▼                          │
//!                 │               ┌────────────┐                    │
//!                 │               │ node pool  │◀── publishes ──┐   │
//!                 │               │ + cursor   │                │   │
//!                 │               └────────────┘         ┌──────┴─┐ │
//!                 │                                      │ prober │─┼──▶ GET /health
//!                 │                                      └────────┘ │
//!                 └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use rekey_balancer::config::{load_config, validation::validate_config, BalancerConfig, ConfigError};
use rekey_balancer::lifecycle::{signals, Shutdown};
use rekey_balancer::observability::{logging, metrics};
use rekey_balancer::HttpServer;

#[derive(Parser)]
#[command(name = "rekey-balancer")]
#[command(about = "Round-robin balancer with health probing for re-key worker nodes", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "REKEY_BALANCER_CONFIG")]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,
}

fn resolve_config(cli: &Cli) -> Result<BalancerConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BalancerConfig::with_default_nodes(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
        validate_config(&config).map_err(ConfigError::Validation)?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(&Default::default());
            tracing::error!(error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!("rekey-balancer v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        nodes = config.nodes.len(),
        probe_interval_ms = config.health_check.interval_ms,
        probe_timeout_ms = config.health_check.timeout_ms,
        forward_timeout_ms = config.forwarding.timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
