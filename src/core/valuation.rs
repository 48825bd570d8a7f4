//! Portfolio-level aggregation of per-fund estimates.
use crate::core::estimate::{EstimateResult, round_to};
use crate::core::model::{NavHistory, PortfolioFund};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A portfolio lot paired with the estimate of its fund.
#[derive(Debug, Clone)]
pub struct PositionInput {
    pub fund_code: String,
    pub fund_name: String,
    pub shares: f64,
    pub cost_nav: f64,
    pub estimate: EstimateResult,
    pub holdings_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionValuation {
    pub fund_code: String,
    pub fund_name: String,
    pub shares: f64,
    pub cost_nav: f64,
    pub est_nav: f64,
    pub est_change_pct: f64,
    pub coverage: f64,
    pub cost: f64,
    pub current_value: f64,
    pub profit: f64,
    pub profit_pct: f64,
    pub holdings_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValuation {
    pub positions: Vec<PositionValuation>,
    pub total_cost: f64,
    pub total_estimate: f64,
    pub total_profit: f64,
    pub total_profit_pct: f64,
}

/// Portfolio value on one historical date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub total_value: f64,
    pub total_cost: f64,
    pub profit_pct: f64,
}

/// `profit / cost × 100`, or 0 when there is no positive cost to divide by.
pub fn profit_pct(profit: f64, cost: f64) -> f64 {
    if cost > 0.0 { profit / cost * 100.0 } else { 0.0 }
}

pub fn value_portfolio(positions: &[PositionInput]) -> PortfolioValuation {
    let mut total_cost = 0.0;
    let mut total_estimate = 0.0;

    let positions = positions
        .iter()
        .map(|position| {
            let est_nav = position.estimate.est_nav;
            let cost = position.shares * position.cost_nav;
            let current_value = position.shares * est_nav;
            let profit = current_value - cost;

            total_cost += cost;
            total_estimate += current_value;

            PositionValuation {
                fund_code: position.fund_code.clone(),
                fund_name: position.fund_name.clone(),
                shares: position.shares,
                cost_nav: position.cost_nav,
                est_nav: round_to(est_nav, 4),
                est_change_pct: round_to(position.estimate.est_change_pct, 4),
                coverage: round_to(position.estimate.coverage, 4),
                cost: round_to(cost, 2),
                current_value: round_to(current_value, 2),
                profit: round_to(profit, 2),
                profit_pct: round_to(profit_pct(profit, cost), 4),
                holdings_date: position.holdings_date,
            }
        })
        .collect();

    let total_profit = total_estimate - total_cost;

    PortfolioValuation {
        positions,
        total_cost: round_to(total_cost, 2),
        total_estimate: round_to(total_estimate, 2),
        total_profit: round_to(total_profit, 2),
        total_profit_pct: round_to(profit_pct(total_profit, total_cost), 4),
    }
}

/// Rebuilds portfolio value from official NAV history.
///
/// Only dates on which every held fund has a NAV are valued, so each point
/// covers the whole portfolio. Dates before `since` are dropped.
pub fn value_history(
    lots: &[PortfolioFund],
    histories: &HashMap<String, NavHistory>,
    since: NaiveDate,
) -> Vec<HistoryPoint> {
    let fund_codes: BTreeSet<&str> = lots.iter().map(|lot| lot.fund_code.as_str()).collect();

    let mut dates: Option<BTreeSet<NaiveDate>> = None;
    for code in &fund_codes {
        let fund_dates: BTreeSet<NaiveDate> = histories
            .get(*code)
            .map(|history| history.range(since..).map(|(date, _)| *date).collect())
            .unwrap_or_default();
        dates = Some(match dates {
            None => fund_dates,
            Some(common) => common.intersection(&fund_dates).copied().collect(),
        });
    }

    let total_cost: f64 = lots.iter().map(PortfolioFund::cost).sum();

    dates
        .unwrap_or_default()
        .into_iter()
        .filter_map(|date| {
            let mut total_value = 0.0;
            for lot in lots {
                let nav = histories.get(&lot.fund_code)?.get(&date)?;
                total_value += lot.shares * nav;
            }
            Some(HistoryPoint {
                date,
                total_value: round_to(total_value, 2),
                total_cost: round_to(total_cost, 2),
                profit_pct: round_to(profit_pct(total_value - total_cost, total_cost), 4),
            })
        })
        .collect()
}

/// `(total_value, total_cost)` for the daily snapshot. Lots whose fund has no
/// NAV in `navs` are valued at zero.
pub fn snapshot_totals(lots: &[PortfolioFund], navs: &HashMap<String, f64>) -> (f64, f64) {
    lots.iter().fold((0.0, 0.0), |(value, cost), lot| {
        let nav = navs.get(&lot.fund_code).copied().unwrap_or(0.0);
        (value + lot.shares * nav, cost + lot.cost())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn date(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    fn lot(fund_code: &str, shares: f64, cost_nav: f64) -> PortfolioFund {
        PortfolioFund {
            id: 0,
            portfolio_id: 1,
            fund_code: fund_code.to_string(),
            shares,
            cost_nav,
            added_at: NaiveDateTime::default(),
        }
    }

    fn position(fund_code: &str, shares: f64, cost_nav: f64, est_nav: f64) -> PositionInput {
        let mut estimate = EstimateResult::flat(est_nav);
        estimate.est_change_pct = 1.5;
        estimate.coverage = 0.4;
        PositionInput {
            fund_code: fund_code.to_string(),
            fund_name: format!("Fund {fund_code}"),
            shares,
            cost_nav,
            estimate,
            holdings_date: None,
        }
    }

    fn history(points: &[(&str, f64)]) -> NavHistory {
        points.iter().map(|(d, nav)| (date(d), *nav)).collect()
    }

    #[test]
    fn test_value_portfolio_per_position() {
        let valuation = value_portfolio(&[position("000001", 1000.0, 1.8, 2.0)]);

        let p = &valuation.positions[0];
        assert_eq!(p.cost, 1800.0);
        assert_eq!(p.current_value, 2000.0);
        assert_eq!(p.profit, 200.0);
        assert!((p.profit_pct - (2.0 - 1.8) / 1.8 * 100.0).abs() < 0.01);
        assert_eq!(p.est_change_pct, 1.5);
        assert_eq!(p.coverage, 0.4);
    }

    #[test]
    fn test_value_portfolio_totals() {
        let valuation = value_portfolio(&[
            position("000001", 1000.0, 1.0, 1.1),
            position("110011", 500.0, 2.0, 1.9),
        ]);

        assert_eq!(valuation.total_cost, 2000.0);
        assert_eq!(valuation.total_estimate, 2050.0);
        assert_eq!(valuation.total_profit, 50.0);
        assert!((valuation.total_profit_pct - 2.5).abs() < 1e-6);
        assert!(valuation.positions[1].profit < 0.0);
    }

    #[test]
    fn test_zero_cost_never_divides() {
        let valuation = value_portfolio(&[position("000001", 100.0, 0.0, 1.2)]);

        assert_eq!(valuation.positions[0].profit_pct, 0.0);
        assert_eq!(valuation.total_profit_pct, 0.0);
        assert_eq!(valuation.total_profit, 120.0);
        assert_eq!(profit_pct(10.0, -5.0), 0.0);
    }

    #[test]
    fn test_value_portfolio_empty() {
        let valuation = value_portfolio(&[]);
        assert!(valuation.positions.is_empty());
        assert_eq!(valuation.total_cost, 0.0);
        assert_eq!(valuation.total_profit_pct, 0.0);
    }

    #[test]
    fn test_value_history_sums_per_date() {
        let lots = vec![lot("110011", 1000.0, 1.0), lot("000001", 500.0, 2.0)];
        let histories = HashMap::from([
            (
                "110011".to_string(),
                history(&[("2026-02-10", 1.10), ("2026-02-11", 1.15), ("2026-02-12", 1.12)]),
            ),
            (
                "000001".to_string(),
                history(&[("2026-02-10", 2.05), ("2026-02-11", 2.10), ("2026-02-12", 2.08)]),
            ),
        ]);

        let points = value_history(&lots, &histories, date("2026-01-01"));

        assert_eq!(points.len(), 3);
        // value = 1000 * 1.10 + 500 * 2.05, cost = 1000 * 1.0 + 500 * 2.0
        assert_eq!(points[0].date, date("2026-02-10"));
        assert_eq!(points[0].total_value, 2125.0);
        assert_eq!(points[0].total_cost, 2000.0);
        assert!((points[0].profit_pct - 6.25).abs() < 0.001);
    }

    #[test]
    fn test_value_history_intersects_dates() {
        let lots = vec![lot("110011", 10.0, 1.0), lot("000001", 10.0, 1.0)];
        let histories = HashMap::from([
            (
                "110011".to_string(),
                history(&[("2026-02-13", 1.0), ("2026-02-10", 1.0), ("2026-02-11", 1.0)]),
            ),
            (
                "000001".to_string(),
                history(&[("2026-02-11", 1.0), ("2026-02-13", 1.0), ("2026-02-12", 1.0)]),
            ),
        ]);

        let dates: Vec<_> = value_history(&lots, &histories, date("2026-01-01"))
            .into_iter()
            .map(|p| p.date)
            .collect();
        assert_eq!(dates, vec![date("2026-02-11"), date("2026-02-13")]);
    }

    #[test]
    fn test_value_history_repeated_lots_share_series() {
        let lots = vec![lot("110011", 100.0, 1.0), lot("110011", 50.0, 1.2)];
        let histories = HashMap::from([(
            "110011".to_string(),
            history(&[("2026-02-10", 1.1), ("2026-02-11", 1.3)]),
        )]);

        let points = value_history(&lots, &histories, date("2026-02-11"));

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].total_value, 195.0);
        assert_eq!(points[0].total_cost, 160.0);
    }

    #[test]
    fn test_value_history_missing_series_yields_nothing() {
        let lots = vec![lot("110011", 100.0, 1.0), lot("000001", 50.0, 1.0)];
        let histories = HashMap::from([(
            "110011".to_string(),
            history(&[("2026-02-10", 1.1)]),
        )]);

        assert!(value_history(&lots, &histories, date("2026-01-01")).is_empty());
        assert!(value_history(&[], &histories, date("2026-01-01")).is_empty());
    }

    #[test]
    fn test_snapshot_totals() {
        let lots = vec![
            lot("000001", 1000.0, 1.8),
            lot("000001", 100.0, 2.1),
            lot("999999", 10.0, 1.0),
        ];
        let navs = HashMap::from([("000001".to_string(), 2.0)]);

        let (value, cost) = snapshot_totals(&lots, &navs);

        assert!((value - 2200.0).abs() < 1e-9);
        assert!((cost - 2020.0).abs() < 1e-9);
    }
}
