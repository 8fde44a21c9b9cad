//! stagehand server binary.
//!
//! Serves the in-memory reference host over the configured transport.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stagehand_server::config::{DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS};
use stagehand_server::{MemoryHost, Server, ServerConfig};
use stagehand_wire::ListenAddr;

#[derive(Parser, Debug)]
#[command(name = "stagehand-server")]
#[command(about = "Remote-control server for a stagehand host")]
struct Cli {
    /// Transport selector: `port:<N>` for loopback TCP, anything else is
    /// taken as a Unix socket path.
    #[arg(long, default_value = "port:4777")]
    listen: ListenAddr,
    /// Minimum seconds between resource polls.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    poll_interval: f64,
    /// Bounded wait for one tool invocation, in seconds.
    #[arg(long, default_value_t = DEFAULT_CALL_TIMEOUT_SECS)]
    call_timeout: f64,
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig {
        listen: cli.listen,
        poll_interval_secs: cli.poll_interval,
        call_timeout_secs: cli.call_timeout,
    };

    let host = Arc::new(MemoryHost::new());
    let server = Server::bind(&config, host.clone(), host).await?;

    // Ctrl-C / SIGTERM trip the same stop handle the `stop` action uses.
    let stop = server.stop_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        stop.stop();
    });

    server.serve().await?;
    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        },
    }
}
