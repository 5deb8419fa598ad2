//! jobwarden - Distributed Job Scheduler
//!
//! CLI entry point for the jobwarden worker.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use server::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod server;

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "jobwarden=info,jobwarden_core=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    let config = server::load_config()?;
    init_tracing(&config.logging);

    cli::run(cli, config).await
}
