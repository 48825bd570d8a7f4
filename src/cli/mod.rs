//! Command-line surface: subcommand definitions and table rendering.

pub mod funds;
pub mod index;
pub mod jobs;
pub mod portfolios;
pub mod setup;
pub mod ui;

use crate::core::period::Period;
use clap::{Subcommand, ValueEnum};

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum FundCommand {
    /// Start tracking a fund: NAV, name and top holdings
    Setup { code: String },
    /// Show a tracked fund and its holdings
    Show { code: String },
    /// List tracked funds
    List,
    /// Real-time NAV estimate from holdings and stock quotes
    Estimate { code: String },
    /// Fetch and store the latest official NAV
    RefreshNav { code: String },
    /// Replace the holdings when a newer quarterly report is out
    RefreshHoldings { code: String },
    /// Official NAV history
    History {
        code: String,
        /// One of 7d, 30d, ytd, 1y, 3y
        #[arg(short, long, default_value_t = Period::ThirtyDays)]
        period: Period,
    },
    /// Today's intraday estimate snapshots
    Intraday { code: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum HistorySource {
    /// Daily snapshots written by the scheduler
    #[default]
    Snapshots,
    /// Rebuilt from official NAV history
    Nav,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum PortfolioCommand {
    /// Create an empty portfolio
    Create { name: String },
    /// List portfolios
    List,
    /// Show positions valued at today's estimates
    Show { id: u64 },
    Rename { id: u64, name: String },
    /// Delete a portfolio with its positions and snapshots
    Delete { id: u64 },
    /// Add a lot of a fund to a portfolio
    Add {
        id: u64,
        code: String,
        shares: f64,
        cost_nav: f64,
    },
    /// Remove every lot of a fund from a portfolio
    Remove { id: u64, code: String },
    /// Portfolio value over time
    History {
        id: u64,
        #[arg(short, long, value_enum, default_value_t = HistorySource::Snapshots)]
        source: HistorySource,
        #[arg(short, long, default_value_t = Period::ThirtyDays)]
        period: Period,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum IndexCommand {
    /// Daily closes of the CSI 300
    History {
        #[arg(short, long, default_value_t = Period::ThirtyDays)]
        period: Period,
    },
    /// Minute prices of the CSI 300 in the latest session
    Intraday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum JobCommand {
    /// Refresh stock quotes and record intraday estimates
    RefreshQuotes,
    /// Write today's portfolio snapshots
    Snapshot,
    /// Pull official NAVs for every tracked fund
    ReconcileNav,
}
