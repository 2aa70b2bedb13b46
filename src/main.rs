//! MCP gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                     MCP GATEWAY                      │
//!                 │                                                      │
//!  Client ───────▶│ request id ─▶ request log ─▶ auth ─▶ rate limit ──┐  │
//!                 │                               │401       │429     │  │
//!                 │                               ▼          ▼        ▼  │
//!  Client ◀───────│◀──────────────── rejection ◀──┴──────────┘  upstream │──▶ MCP server
//!                 │                                                      │
//!                 │  config (TOML + MCP_API_KEYS, hot reload of keys)    │
//!                 │  observability (tracing, Prometheus metrics)         │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use mcp_gateway::config::{loader, watcher::ConfigWatcher};
use mcp_gateway::lifecycle::{wait_for_signal, Shutdown};
use mcp_gateway::observability::{logging, metrics};
use mcp_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "mcp-gateway")]
#[command(about = "API key authentication and rate limiting in front of an MCP server", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "MCP_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Watch the configuration file and reload API keys on change.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => loader::load_config(path)?,
        None => loader::default_config()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!("mcp-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        auth_mode = ?config.auth.mode,
        window_secs = config.rate_limit.window_secs,
        anonymous_max = config.rate_limit.anonymous_max,
        authenticated_max = config.rate_limit.authenticated_max,
        composition = ?config.rate_limit.composition,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher handle alive for the lifetime of the server.
    let (_watcher, config_updates) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, rx) = ConfigWatcher::new(path, &config);
            (Some(watcher.run()?), rx)
        }
        _ => (None, mpsc::unbounded_channel().1),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
