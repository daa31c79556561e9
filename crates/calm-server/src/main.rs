//! Calm server - local bridge between a box breathing UI and the session engine.

use anyhow::Result;
use calm_server::{config::Config, logging, router, state::AppState};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use logging::{LogConfig, LogFormat};

/// Calm server - box breathing session engine with an HTTP/WebSocket bridge.
#[derive(Parser, Debug)]
#[command(name = "calm-server")]
#[command(about = "Box breathing session engine with a local HTTP/WebSocket bridge")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging (adds phase transitions)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging (DEBUG level, excludes per-tick traces)
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (every tick)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "clock=debug").
    /// Can be specified multiple times. Targets are prefixed with "calm::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(
        target: "calm::startup",
        "Loaded configuration (port: {}, {}s phases, {}s session)",
        config.port,
        config.phase_duration_seconds,
        config.session_length_seconds
    );

    let addr = config.listen_addr().await?;
    let state = Arc::new(AppState::new(config));
    let app = router(state.clone());

    tracing::info!(target: "calm::startup", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // A run still in progress ends with the process.
    state.controller.stop();
    tracing::info!(target: "calm::startup", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "calm::startup", "Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
