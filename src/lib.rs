pub mod cli;
pub mod core;
pub mod monitor;
pub mod providers;
pub mod scheduler;
pub mod store;

use crate::cli::{FundCommand, IndexCommand, JobCommand, PortfolioCommand};
use crate::core::config::AppConfig;
use crate::monitor::Monitor;
use crate::scheduler::Scheduler;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Serve,
    Fund(FundCommand),
    Portfolio(PortfolioCommand),
    Index(IndexCommand),
    Job(JobCommand),
}

pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let monitor = Arc::new(Monitor::from_config(&config)?);

    match command {
        AppCommand::Serve => serve(monitor, &config).await,
        AppCommand::Fund(command) => cli::funds::run(&monitor, command).await,
        AppCommand::Portfolio(command) => cli::portfolios::run(&monitor, command).await,
        AppCommand::Index(command) => cli::index::run(&monitor, command).await,
        AppCommand::Job(command) => cli::jobs::run(&monitor, command).await,
    }
}

/// Runs the scheduler in the foreground until Ctrl+C.
async fn serve(monitor: Arc<Monitor>, config: &AppConfig) -> Result<()> {
    info!("fundmon starting...");
    let scheduler = Scheduler::start(monitor, &config.scheduler);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    scheduler.shutdown().await;
    Ok(())
}
