//! Core business logic: estimation, aggregation and the abstractions they rely on

pub mod cache;
pub mod config;
pub mod error;
pub mod estimate;
pub mod log;
pub mod market;
pub mod model;
pub mod period;
pub mod valuation;

// Re-export main types for cleaner imports
pub use cache::TtlCache;
pub use error::MonitorError;
pub use estimate::{EstimateResult, StockContribution, calculate_estimate};
pub use market::{FundInfoProvider, FundNavProvider, MarketSources, QuoteProvider, TradingCalendar};
pub use period::Period;
