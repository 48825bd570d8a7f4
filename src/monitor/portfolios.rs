use super::Monitor;
use crate::core::error::{MonitorError, Result};
use crate::core::estimate::{EstimateResult, calculate_estimate};
use crate::core::model::{Portfolio, PortfolioFund, PortfolioSnapshot};
use crate::core::period::Period;
use crate::core::valuation::{self, HistoryPoint, PortfolioValuation, PositionInput};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioDetail {
    pub portfolio: Portfolio,
    pub trading_day: bool,
    #[serde(flatten)]
    pub valuation: PortfolioValuation,
}

fn clean_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(MonitorError::invalid("Name cannot be empty"));
    }
    Ok(name)
}

impl Monitor {
    fn require_portfolio(&self, id: u64) -> Result<Portfolio> {
        self.store
            .get_portfolio(id)?
            .ok_or_else(|| MonitorError::not_found("Portfolio", id))
    }

    pub fn create_portfolio(&self, name: &str) -> Result<Portfolio> {
        let name = clean_name(name)?;
        let portfolio = self.store.create_portfolio(name, self.now().naive_local())?;
        info!("Created portfolio {} ({})", portfolio.id, portfolio.name);
        Ok(portfolio)
    }

    pub fn portfolio(&self, id: u64) -> Result<Portfolio> {
        self.require_portfolio(id)
    }

    pub fn list_portfolios(&self) -> Result<Vec<Portfolio>> {
        Ok(self.store.list_portfolios()?)
    }

    pub fn rename_portfolio(&self, id: u64, name: &str) -> Result<Portfolio> {
        let name = clean_name(name)?;
        self.store
            .rename_portfolio(id, name)?
            .ok_or_else(|| MonitorError::not_found("Portfolio", id))
    }

    /// Deletes the portfolio along with its lots and snapshots.
    pub fn delete_portfolio(&self, id: u64) -> Result<()> {
        if !self.store.delete_portfolio(id)? {
            return Err(MonitorError::not_found("Portfolio", id));
        }
        info!("Deleted portfolio {}", id);
        Ok(())
    }

    /// Records a purchase as a new lot, even when the fund is already held.
    pub fn add_position(
        &self,
        portfolio_id: u64,
        fund_code: &str,
        shares: f64,
        cost_nav: f64,
    ) -> Result<PortfolioFund> {
        self.require_portfolio(portfolio_id)?;
        let fund_code = fund_code.trim();
        if fund_code.is_empty() {
            return Err(MonitorError::invalid("Fund code cannot be empty"));
        }
        if !shares.is_finite() || shares <= 0.0 {
            return Err(MonitorError::invalid("Shares must be positive"));
        }
        if !cost_nav.is_finite() || cost_nav < 0.0 {
            return Err(MonitorError::invalid("Cost NAV cannot be negative"));
        }

        let lot = self.store.add_position(
            portfolio_id,
            fund_code,
            shares,
            cost_nav,
            self.now().naive_local(),
        )?;
        debug!(
            "Added {} shares of {} to portfolio {}",
            shares, fund_code, portfolio_id
        );
        Ok(lot)
    }

    /// Removes every lot of the fund. Returns how many lots were removed.
    pub fn remove_fund(&self, portfolio_id: u64, fund_code: &str) -> Result<usize> {
        self.require_portfolio(portfolio_id)?;
        Ok(self.store.remove_fund(portfolio_id, fund_code)?)
    }

    pub fn positions(&self, portfolio_id: u64) -> Result<Vec<PortfolioFund>> {
        self.require_portfolio(portfolio_id)?;
        Ok(self.store.positions(portfolio_id)?)
    }

    /// Live valuation of every lot. The trading day is checked once for the
    /// whole portfolio.
    pub async fn portfolio_detail(&self, id: u64) -> Result<PortfolioDetail> {
        let portfolio = self.require_portfolio(id)?;
        let lots = self.store.positions(id)?;
        let trading_day = self.is_trading_day(self.now().date_naive()).await;

        let mut inputs = Vec::with_capacity(lots.len());
        for lot in &lots {
            let fund = self.store.get_fund(&lot.fund_code)?;
            let last_nav = fund.as_ref().and_then(|f| f.last_nav).unwrap_or(0.0);
            let fund_name = fund
                .as_ref()
                .map(|f| f.fund_name.clone())
                .unwrap_or_else(|| lot.fund_code.clone());

            let mut estimate = EstimateResult::flat(last_nav);
            let mut holdings_date = None;
            if trading_day && last_nav > 0.0 {
                let holdings = self.store.holdings(&lot.fund_code)?;
                if !holdings.is_empty() {
                    holdings_date = holdings.first().map(|h| h.report_date);
                    let codes: Vec<String> =
                        holdings.iter().map(|h| h.stock_code.clone()).collect();
                    let quotes = self.resolve_quotes(&codes).await;
                    estimate = calculate_estimate(&holdings, &quotes, last_nav);
                }
            }

            inputs.push(PositionInput {
                fund_code: lot.fund_code.clone(),
                fund_name,
                shares: lot.shares,
                cost_nav: lot.cost_nav,
                estimate,
                holdings_date,
            });
        }

        Ok(PortfolioDetail {
            portfolio,
            trading_day,
            valuation: valuation::value_portfolio(&inputs),
        })
    }

    /// Stored end-of-day snapshots within the period, ascending by date.
    pub fn snapshot_history(&self, id: u64, period: Period) -> Result<Vec<PortfolioSnapshot>> {
        self.require_portfolio(id)?;
        let cutoff = period.cutoff(self.now().date_naive());
        Ok(self.store.portfolio_snapshots_since(id, cutoff)?)
    }

    /// Portfolio value rebuilt from the official NAV history of its funds.
    pub async fn value_history(&self, id: u64, period: Period) -> Result<Vec<HistoryPoint>> {
        self.require_portfolio(id)?;
        let lots = self.store.positions(id)?;
        let codes: BTreeSet<&str> = lots.iter().map(|lot| lot.fund_code.as_str()).collect();

        let histories: HashMap<String, _> = join_all(codes.into_iter().map(|code| async move {
            (code.to_string(), self.nav_history_of(code).await)
        }))
        .await
        .into_iter()
        .collect();

        let cutoff = period.cutoff(self.now().date_naive());
        Ok(valuation::value_history(&lots, &histories, cutoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::*;

    #[test]
    fn test_portfolio_crud() {
        let env = TestEnv::new();
        let monitor = &env.monitor;

        let growth = monitor.create_portfolio("  Growth ").unwrap();
        assert_eq!(growth.name, "Growth");
        assert!(matches!(
            monitor.create_portfolio(" ").unwrap_err(),
            MonitorError::InvalidInput(_)
        ));

        let renamed = monitor.rename_portfolio(growth.id, "Core").unwrap();
        assert_eq!(renamed.name, "Core");
        assert!(matches!(
            monitor.rename_portfolio(growth.id, "").unwrap_err(),
            MonitorError::InvalidInput(_)
        ));
        assert!(matches!(
            monitor.rename_portfolio(42, "Other").unwrap_err(),
            MonitorError::NotFound { .. }
        ));

        monitor.delete_portfolio(growth.id).unwrap();
        assert!(monitor.list_portfolios().unwrap().is_empty());
        assert!(monitor.delete_portfolio(growth.id).is_err());
    }

    #[test]
    fn test_add_position_validation() {
        let env = TestEnv::new();
        let id = env.monitor.create_portfolio("Growth").unwrap().id;

        for (shares, cost_nav) in [(0.0, 1.0), (-5.0, 1.0), (10.0, -0.1), (f64::NAN, 1.0)] {
            let err = env.monitor.add_position(id, "000001", shares, cost_nav).unwrap_err();
            assert!(err.is_client_error(), "{shares} @ {cost_nav} accepted");
        }
        assert!(matches!(
            env.monitor.add_position(99, "000001", 10.0, 1.0).unwrap_err(),
            MonitorError::NotFound { .. }
        ));

        // A zero cost basis is allowed
        env.monitor.add_position(id, "000001", 10.0, 0.0).unwrap();
        env.monitor.add_position(id, "000001", 5.0, 1.2).unwrap();
        assert_eq!(env.monitor.positions(id).unwrap().len(), 2);

        assert_eq!(env.monitor.remove_fund(id, "000001").unwrap(), 2);
        assert!(env.monitor.positions(id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_portfolio_detail_values_every_lot() {
        let env = TestEnv::new();
        env.track_fund("000001", Some(2.0), vec![holding("600519", 0.5)]);
        env.market.set_quote("600519", 1700.0, 2.0);
        let id = env.monitor.create_portfolio("Growth").unwrap().id;
        env.monitor.add_position(id, "000001", 1000.0, 1.8).unwrap();
        env.monitor.add_position(id, "000001", 500.0, 2.1).unwrap();
        env.monitor.add_position(id, "999999", 100.0, 1.0).unwrap();

        let detail = env.monitor.portfolio_detail(id).await.unwrap();
        let valuation = &detail.valuation;

        assert!(detail.trading_day);
        assert_eq!(valuation.positions.len(), 3);
        // est_nav = 2.0 * (1 + 0.5 * 2.0 / 100) = 2.02
        assert_eq!(valuation.positions[0].est_nav, 2.02);
        assert_eq!(valuation.positions[0].current_value, 2020.0);
        assert_eq!(valuation.positions[0].profit, 220.0);
        assert_eq!(valuation.positions[1].current_value, 1010.0);
        assert_eq!(valuation.positions[0].holdings_date, Some(date(2025, 12, 31)));

        // Unknown fund: valued at zero under its code
        assert_eq!(valuation.positions[2].fund_name, "999999");
        assert_eq!(valuation.positions[2].est_nav, 0.0);
        assert_eq!(valuation.positions[2].profit, -100.0);

        assert_eq!(valuation.total_cost, 2950.0);
        assert_eq!(valuation.total_estimate, 3030.0);
        assert_eq!(valuation.total_profit, 80.0);
        assert_eq!(env.market.calendar_calls(), 1);
    }

    #[tokio::test]
    async fn test_portfolio_detail_flat_when_closed() {
        let env = TestEnv::new();
        env.track_fund("000001", Some(2.0), vec![holding("600519", 0.5)]);
        env.market.set_quote("600519", 1700.0, 2.0);
        env.market.set_trading(false);
        let id = env.monitor.create_portfolio("Growth").unwrap().id;
        env.monitor.add_position(id, "000001", 100.0, 2.0).unwrap();

        let detail = env.monitor.portfolio_detail(id).await.unwrap();

        assert!(!detail.trading_day);
        let position = &detail.valuation.positions[0];
        assert_eq!(position.est_nav, 2.0);
        assert_eq!(position.coverage, 0.0);
        assert_eq!(position.holdings_date, None);
        assert_eq!(detail.valuation.total_profit_pct, 0.0);
        assert_eq!(env.market.quote_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_portfolio_detail() {
        let env = TestEnv::new();
        let id = env.monitor.create_portfolio("Empty").unwrap().id;

        let detail = env.monitor.portfolio_detail(id).await.unwrap();
        assert!(detail.valuation.positions.is_empty());
        assert_eq!(detail.valuation.total_estimate, 0.0);
        assert!(env.monitor.portfolio_detail(id + 1).await.is_err());
    }

    #[tokio::test]
    async fn test_value_history_from_nav_series() {
        let env = TestEnv::new();
        env.market.set_history(
            "110011",
            &[(date(2026, 2, 10), 1.10), (date(2026, 2, 11), 1.15)],
        );
        env.market.set_history(
            "000001",
            &[(date(2026, 2, 10), 2.05), (date(2026, 2, 11), 2.10)],
        );
        let id = env.monitor.create_portfolio("Growth").unwrap().id;
        env.monitor.add_position(id, "110011", 1000.0, 1.0).unwrap();
        env.monitor.add_position(id, "000001", 500.0, 2.0).unwrap();

        let points = env.monitor.value_history(id, Period::ThirtyDays).await.unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, date(2026, 2, 10));
        assert_eq!(points[0].total_value, 2125.0);
        assert_eq!(points[1].total_value, 2200.0);
        assert_eq!(points[1].total_cost, 2000.0);
        assert!((points[1].profit_pct - 10.0).abs() < 1e-9);
        assert_eq!(env.market.history_calls(), 2);
    }

    #[test]
    fn test_snapshot_history_window() {
        let env = TestEnv::new();
        let id = env.monitor.create_portfolio("Growth").unwrap().id;
        for (day, value) in [(date(2026, 1, 5), 900.0), (date(2026, 2, 17), 1100.0)] {
            env.store
                .upsert_portfolio_snapshot(&PortfolioSnapshot {
                    portfolio_id: id,
                    snapshot_date: day,
                    total_value: value,
                    total_cost: 1000.0,
                })
                .unwrap();
        }

        let week = env.monitor.snapshot_history(id, Period::SevenDays).unwrap();
        assert_eq!(week.len(), 1);
        assert!((week[0].profit_pct() - 10.0).abs() < 1e-9);

        let ytd = env.monitor.snapshot_history(id, Period::YearToDate).unwrap();
        assert_eq!(ytd.len(), 2);
    }
}
