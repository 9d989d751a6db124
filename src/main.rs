//! HTTP echo server.
//!
//! Answers every request with a JSON description of the request itself.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request      ┌─────────┐    ┌──────────────────┐
//!     ───────────────────▶│  http   │───▶│     snapshot     │
//!                         │ server  │    │ body / headers / │
//!                         └────┬────┘    │ cookies / parts  │
//!                              │         └────────┬─────────┘
//!     Client Response          │                  │
//!     ◀────────────────────────┘◀── FieldBag ─────┘──▶ log line
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use echo_server::config::validation::validate_config;
use echo_server::config::{load_config, ConfigError, ServerConfig};
use echo_server::lifecycle::signals::spawn_signal_handler;
use echo_server::observability::{logging, metrics};
use echo_server::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "echo-server")]
#[command(about = "Replies to every HTTP request with a JSON description of it", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

fn resolve_config(cli: &Cli) -> Result<ServerConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init_logging(&config.observability);

    tracing::info!("echo-server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        body_fallback = ?config.echo.body_fallback,
        preview_limit = config.echo.preview_limit,
        request_timeout_secs = config.timeouts.request_secs,
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
    tracing::info!(
        address = %listener.local_addr()?,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    let server = HttpServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
