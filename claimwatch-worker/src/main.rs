//! # Claimwatch Worker
//!
//! Watches one flat directory for data files, claims each file exactly once
//! across restarts and sibling workers sharing the lock directory, simulates
//! the declared work, and periodically reports the running totals.

mod cli;
mod settings;

use anyhow::Context;
use clap::Parser;
use claimwatch_core::Worker;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::settings::ConfigSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file_loaded = dotenvy::dotenv().is_ok();
    let cli = Cli::parse();

    // Logs go to stderr so report lines on stdout stay machine-readable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if env_file_loaded {
        info!("loaded .env file");
    }

    let (config, source) = settings::load(&cli)?;
    match &source {
        ConfigSource::Default => info!("using default worker configuration"),
        ConfigSource::Explicit(path) | ConfigSource::File(path) => {
            info!(path = %path.display(), "worker configuration loaded from file")
        }
    }
    info!(
        directory = %cli.directory.display(),
        lock_dir = %config.lock_dir.display(),
        extension = %config.normalized_extension(),
        seconds_per_unit = config.seconds_per_unit,
        report_interval = config.report_interval,
        serialize_processing = config.serialize_processing,
        "worker configuration in effect"
    );

    let handle = Worker::new(&cli.directory, config)
        .watch(!cli.no_watch)
        .start()
        .await
        .context("failed to start worker")?;

    if handle.is_watching() {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("shutdown requested");
    }

    handle.shutdown().await;
    Ok(())
}
