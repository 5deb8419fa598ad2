//! CLI module for jobwarden
//!
//! Provides commands:
//! - `run`: Start the worker (scheduler + stale job report)
//! - `jobs`: Administer the shared job store

use crate::server::config::AppConfig;
use clap::{Parser, Subcommand};

pub mod jobs;

/// Distributed job scheduler worker
#[derive(Parser, Debug)]
#[command(name = "jobwarden")]
#[command(about = "Distributed job scheduler with lease-guarded periodic jobs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the worker
    Run,
    /// Manage jobs in the store
    Jobs {
        #[command(subcommand)]
        command: jobs::JobsCommand,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Run) => crate::server::run(config).await,
        Some(Commands::Jobs { command }) => jobs::run(command, &config).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
