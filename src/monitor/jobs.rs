//! Bodies of the scheduled jobs. Each takes the current time explicitly so
//! it can be run on demand.

use super::Monitor;
use crate::core::error::Result;
use crate::core::estimate::{calculate_estimate, round_to};
use crate::core::market::is_trading_hours;
use crate::core::model::{EstimateSnapshot, Fund, Holding, PortfolioSnapshot};
use crate::core::valuation::snapshot_totals;
use chrono::DateTime;
use chrono_tz::Tz;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuoteRefreshReport {
    /// Outside trading hours or on a market holiday: nothing was fetched.
    pub skipped: bool,
    pub requested: usize,
    pub received: usize,
    pub snapshots: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotReport {
    pub skipped: bool,
    pub portfolios: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub updated: usize,
    pub unavailable: usize,
}

impl Monitor {
    fn funds_with_holdings(&self) -> Result<Vec<(Fund, Vec<Holding>)>> {
        self.store
            .list_funds()?
            .into_iter()
            .map(|fund| {
                let holdings = self.store.holdings(&fund.fund_code)?;
                Ok((fund, holdings))
            })
            .collect()
    }

    /// Fetches quotes for every held stock, refills the quote cache and
    /// records an intraday estimate for each fund that can be estimated.
    pub async fn refresh_quotes_at(&self, now: DateTime<Tz>) -> Result<QuoteRefreshReport> {
        if !is_trading_hours(&now, &self.sessions) {
            debug!("Outside trading hours at {}, skipping quote refresh", now);
            return Ok(QuoteRefreshReport {
                skipped: true,
                ..Default::default()
            });
        }
        if !self.is_trading_day(now.date_naive()).await {
            debug!("Market closed on {}, skipping quote refresh", now.date_naive());
            return Ok(QuoteRefreshReport {
                skipped: true,
                ..Default::default()
            });
        }

        let funds = self.funds_with_holdings()?;
        let codes = Self::union_codes(funds.iter().map(|(_, holdings)| holdings));
        if codes.is_empty() {
            return Ok(QuoteRefreshReport::default());
        }

        let quotes = self.sources.quotes.get_stock_quotes(&codes).await;
        for (code, quote) in &quotes {
            self.quotes.set(code.clone(), quote.clone(), None).await;
        }
        self.estimates.clear().await;

        let mut snapshots = 0;
        for (fund, holdings) in &funds {
            let Some(last_nav) = fund.last_nav else {
                continue;
            };
            if holdings.is_empty() {
                continue;
            }
            let estimate = calculate_estimate(holdings, &quotes, last_nav);
            self.store.append_estimate_snapshot(&EstimateSnapshot {
                fund_code: fund.fund_code.clone(),
                est_nav: estimate.est_nav,
                est_change_pct: estimate.est_change_pct,
                snapshot_date: now.date_naive(),
                snapshot_time: now.time(),
            })?;
            snapshots += 1;
        }

        info!(
            "Updated {}/{} stock quotes, {} estimate snapshots",
            quotes.len(),
            codes.len(),
            snapshots
        );
        Ok(QuoteRefreshReport {
            skipped: false,
            requested: codes.len(),
            received: quotes.len(),
            snapshots,
        })
    }

    /// Best available NAV for today's close: an estimate from cached quotes,
    /// then the latest intraday snapshot, then the official NAV.
    async fn closing_nav(&self, fund: &Fund, now: DateTime<Tz>) -> Result<Option<f64>> {
        let Some(last_nav) = fund.last_nav else {
            return Ok(None);
        };
        let holdings = self.store.holdings(&fund.fund_code)?;
        let codes: Vec<String> = holdings.iter().map(|h| h.stock_code.clone()).collect();
        let quotes = self.quotes.get_many(&codes).await;
        if !holdings.is_empty() && !quotes.is_empty() {
            return Ok(Some(calculate_estimate(&holdings, &quotes, last_nav).est_nav));
        }

        let latest = self
            .store
            .estimate_snapshots_on(&fund.fund_code, now.date_naive())?
            .pop();
        Ok(Some(latest.map_or(last_nav, |snapshot| snapshot.est_nav)))
    }

    /// Writes today's value of every portfolio, replacing an earlier run's row.
    pub async fn snapshot_portfolios_at(&self, now: DateTime<Tz>) -> Result<SnapshotReport> {
        let today = now.date_naive();
        if !self.is_trading_day(today).await {
            debug!("Market closed on {}, skipping portfolio snapshot", today);
            return Ok(SnapshotReport {
                skipped: true,
                portfolios: 0,
            });
        }

        let mut navs: HashMap<String, f64> = HashMap::new();
        let portfolios = self.store.list_portfolios()?;
        for portfolio in &portfolios {
            let lots = self.store.positions(portfolio.id)?;
            for lot in &lots {
                if navs.contains_key(&lot.fund_code) {
                    continue;
                }
                let Some(fund) = self.store.get_fund(&lot.fund_code)? else {
                    continue;
                };
                if let Some(nav) = self.closing_nav(&fund, now).await? {
                    navs.insert(fund.fund_code, nav);
                }
            }

            let (total_value, total_cost) = snapshot_totals(&lots, &navs);
            self.store.upsert_portfolio_snapshot(&PortfolioSnapshot {
                portfolio_id: portfolio.id,
                snapshot_date: today,
                total_value: round_to(total_value, 2),
                total_cost: round_to(total_cost, 2),
            })?;
        }

        info!("Saved {} portfolio snapshots for {}", portfolios.len(), today);
        Ok(SnapshotReport {
            skipped: false,
            portfolios: portfolios.len(),
        })
    }

    /// Pulls the official NAV of every fund and stores those that moved to a
    /// new date.
    pub async fn reconcile_navs(&self) -> Result<ReconcileReport> {
        let funds = self.store.list_funds()?;
        let fetched = join_all(funds.iter().map(|fund| async move {
            self.sources.navs.get_fund_nav(&fund.fund_code).await
        }))
        .await;

        let updated_at = self.now().naive_local();
        let mut report = ReconcileReport {
            checked: funds.len(),
            ..Default::default()
        };
        for (fund, nav) in funds.iter().zip(fetched) {
            let Some(nav) = nav else {
                warn!("No official NAV for {}", fund.fund_code);
                report.unavailable += 1;
                continue;
            };
            if fund.nav_date == Some(nav.nav_date) {
                continue;
            }
            self.store
                .update_nav(&fund.fund_code, nav.nav, nav.nav_date, updated_at)?;
            let key = fund.fund_code.clone();
            self.estimates.delete(&key).await;
            self.nav_histories.delete(&key).await;
            debug!(
                "NAV of {} moved to {} on {}",
                fund.fund_code, nav.nav, nav.nav_date
            );
            report.updated += 1;
        }

        info!(
            "Reconciled NAVs: {} checked, {} updated, {} unavailable",
            report.checked, report.updated, report.unavailable
        );
        Ok(report)
    }
}
