//! GophKeeper Server

use clap::Parser;
use gophkeeper_server::{Server, ServerConfig};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gophkeeper-server", about = "GophKeeper vault sync server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "gophkeeper-server.toml")]
    config: PathBuf,

    /// Listen address override
    #[arg(short = 'a', long, env = "GOPHKEEPER_ADDRESS")]
    address: Option<String>,

    /// Database DSN override (file path or `:memory:`)
    #[arg(short, long, env = "GOPHKEEPER_DATABASE_DSN")]
    database_dsn: Option<String>,

    /// Per-call store deadline in seconds
    #[arg(short, long, env = "GOPHKEEPER_OPERATION_TIMEOUT")]
    operation_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut cfg = if cli.config.exists() {
        ServerConfig::load(&cli.config)?
    } else {
        tracing::info!("No config file found, using defaults");
        ServerConfig::default()
    };

    if let Some(address) = cli.address {
        cfg.listen_addr = address;
    }
    if let Some(dsn) = cli.database_dsn {
        cfg.database_dsn = dsn;
    }
    if let Some(secs) = cli.operation_timeout {
        cfg.operation_timeout_secs = secs;
    }

    tracing::info!("Starting GophKeeper server on {}", cfg.listen_addr);

    let server = Server::bind(cfg).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
        // Keep the sender alive so receivers see `true`, not a closed channel.
        std::future::pending::<()>().await;
    });

    server.run(shutdown_rx).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("cannot install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
