//! Real-time NAV estimation from disclosed holdings.
//!
//! The estimate projects today's stock moves onto the fund's top holdings:
//!
//! ```text
//! est_change_pct = Σ holding_ratio × change_pct   (holdings with a quote)
//! est_nav        = last_nav × (1 + est_change_pct / 100)
//! ```
//!
//! Holdings without a quote are skipped entirely, so `coverage` tells the
//! caller how much of the fund the number is based on. The sum is not
//! rescaled by coverage.
use crate::core::model::{Holding, Quote};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockContribution {
    pub stock_code: String,
    pub stock_name: String,
    pub holding_ratio: f64,
    pub price: f64,
    pub change_pct: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateResult {
    pub est_nav: f64,
    pub est_change_pct: f64,
    /// Sum of holding ratios that had a quote. Not normalised against 1.
    pub coverage: f64,
    pub last_nav: f64,
    pub details: Vec<StockContribution>,
}

impl EstimateResult {
    /// Result reported when the market is closed today: stock changes on
    /// those days describe the previous session and must not move the NAV.
    pub fn flat(last_nav: f64) -> Self {
        Self {
            est_nav: last_nav,
            est_change_pct: 0.0,
            coverage: 0.0,
            last_nav,
            details: Vec::new(),
        }
    }
}

/// Rounds half away from zero to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn calculate_estimate(
    holdings: &[Holding],
    quotes: &HashMap<String, Quote>,
    last_nav: f64,
) -> EstimateResult {
    let mut est_change_pct = 0.0;
    let mut coverage = 0.0;
    let mut details = Vec::new();

    for holding in holdings {
        let Some(quote) = quotes.get(&holding.stock_code) else {
            continue;
        };

        let contribution = holding.holding_ratio * quote.change_pct;
        est_change_pct += contribution;
        coverage += holding.holding_ratio;

        details.push(StockContribution {
            stock_code: holding.stock_code.clone(),
            stock_name: holding.stock_name.clone(),
            holding_ratio: holding.holding_ratio,
            price: quote.price,
            change_pct: quote.change_pct,
            contribution: round_to(contribution, 4),
        });
    }

    let est_nav = last_nav * (1.0 + est_change_pct / 100.0);

    EstimateResult {
        est_nav: round_to(est_nav, 4),
        est_change_pct: round_to(est_change_pct, 4),
        coverage: round_to(coverage, 4),
        last_nav,
        details,
    }
}
