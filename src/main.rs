use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fundmon::cli::{FundCommand, IndexCommand, JobCommand, PortfolioCommand};
use fundmon::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for fundmon::AppCommand {
    fn from(cmd: Commands) -> fundmon::AppCommand {
        match cmd {
            Commands::Serve => fundmon::AppCommand::Serve,
            Commands::Fund { command } => fundmon::AppCommand::Fund(command),
            Commands::Portfolio { command } => fundmon::AppCommand::Portfolio(command),
            Commands::Index { command } => fundmon::AppCommand::Index(command),
            Commands::Job { command } => fundmon::AppCommand::Job(command),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Run the background jobs until interrupted
    Serve,
    /// Track funds and estimate their NAV
    Fund {
        #[command(subcommand)]
        command: FundCommand,
    },
    /// Manage portfolios
    Portfolio {
        #[command(subcommand)]
        command: PortfolioCommand,
    },
    /// CSI 300 benchmark charts
    Index {
        #[command(subcommand)]
        command: IndexCommand,
    },
    /// Run a scheduler job once
    Job {
        #[command(subcommand)]
        command: JobCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => fundmon::cli::setup::setup(),
        Some(cmd) => fundmon::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
