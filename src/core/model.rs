//! Records persisted by the store and values exchanged with market data sources.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fund type recorded when the fund directory has no entry for a code.
pub const UNKNOWN_FUND_TYPE: &str = "未知";

/// A tracked fund. `last_nav` is the last officially published NAV, never an estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fund {
    pub fund_code: String,
    pub fund_name: String,
    pub fund_type: String,
    pub last_nav: Option<f64>,
    pub nav_date: Option<NaiveDate>,
    pub updated_at: NaiveDateTime,
}

/// One disclosed stock position of a fund, as of its report date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub stock_code: String,
    pub stock_name: String,
    /// Fraction of fund assets, in `[0, 1]`.
    pub holding_ratio: f64,
    pub report_date: NaiveDate,
}

/// Point-in-time stock quote, keyed by stock code wherever it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    /// Percent change relative to the prior close.
    pub change_pct: f64,
    pub name: String,
}

/// Latest official NAV published for a fund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundNav {
    pub nav: f64,
    pub nav_date: NaiveDate,
    pub acc_nav: Option<f64>,
}

/// Directory entry for a fund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundInfo {
    pub fund_code: String,
    pub fund_name: String,
    pub fund_type: String,
}

/// Official NAV by date, ascending.
pub type NavHistory = BTreeMap<NaiveDate, f64>;

/// Daily closing level of an index, ascending by date.
pub type IndexHistory = BTreeMap<NaiveDate, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPoint {
    pub time: NaiveDateTime,
    pub price: f64,
}

/// Latest session's minute prices of an index and the close before it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexTrend {
    pub pre_close: Option<f64>,
    pub points: Vec<IndexPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: u64,
    pub name: String,
    pub created_at: NaiveDateTime,
}

/// One lot of a fund inside a portfolio. Repeated purchases are separate lots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioFund {
    pub id: u64,
    pub portfolio_id: u64,
    pub fund_code: String,
    pub shares: f64,
    pub cost_nav: f64,
    pub added_at: NaiveDateTime,
}

impl PortfolioFund {
    pub fn cost(&self) -> f64 {
        self.shares * self.cost_nav
    }
}

/// Intraday estimate captured by the quote refresh job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateSnapshot {
    pub fund_code: String,
    pub est_nav: f64,
    pub est_change_pct: f64,
    pub snapshot_date: NaiveDate,
    pub snapshot_time: NaiveTime,
}

/// End-of-day portfolio valuation. At most one per portfolio per date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub portfolio_id: u64,
    pub snapshot_date: NaiveDate,
    pub total_value: f64,
    pub total_cost: f64,
}

impl PortfolioSnapshot {
    /// Derived on read so it always agrees with the stored totals.
    pub fn profit_pct(&self) -> f64 {
        if self.total_cost <= 0.0 {
            return 0.0;
        }
        (self.total_value - self.total_cost) / self.total_cost * 100.0
    }
}
