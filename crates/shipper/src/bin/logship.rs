//! logship: drains JSON log events from Redis lists into daily
//! Elasticsearch-compatible indices.
//!
//! Startup is fail-fast: both backends are probed before the first
//! dequeue, and an unreachable backend exits the process non-zero.
//! SIGINT during the blocking dequeue shuts the loop down cleanly.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::Notify;
use tracing::info;

use logship_core::Config;
use logship_shipper::{startup, Shipper};

/// Queue-to-search log shipper.
#[derive(Parser, Debug)]
#[command(name = "logship", version, about)]
struct Cli {
    /// Path to the logship.toml config file.
    #[arg(long, env = "LOGSHIP_CONFIG", default_value = "config/logship.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("launching logship");
    let config = Config::load(&cli.config)?;
    config.log_summary();

    let (queue, search) = startup::connect(&config).await?;

    let shutdown = Arc::new(Notify::new());
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                shutdown.notify_one();
            }
        });
    }

    Shipper::new(queue, search, &config).run(shutdown).await?;
    info!("logship exited cleanly");
    Ok(())
}
