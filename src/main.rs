//! rogue-mysql: a MySQL-lookalike honeypot
//!
//! Greets clients like a MySQL 5.6 server, accepts any login, and answers
//! every query with a `LOAD DATA LOCAL INFILE` request for a configured
//! path. Clients with local-infile enabled send that file back, and its
//! contents are logged.
//!
//! Features:
//! - Byte-exact packet framing and handshake
//! - Per-connection sessions with idle timeout and graceful shutdown
//! - Configuration via CLI arguments or TOML file

mod config;
mod error;
mod events;
mod protocols;
mod server;

use config::Config;
use server::Server;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        file = %config.file,
        workers = ?config.workers,
        max_connections = config.max_connections,
        idle_timeout = ?config.idle_timeout,
        "Starting rogue-mysql"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = CancellationToken::new();

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down");
                signal.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    Server::new(config).run(shutdown).await?;
    Ok(())
}
