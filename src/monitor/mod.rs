//! The long-lived monitor: owns the store, the caches and the market data
//! sources, and exposes every fund and portfolio operation.

mod index;
mod jobs;
mod portfolios;
#[cfg(test)]
pub(crate) mod testing;

pub use index::{BENCHMARK_NAME, IndexIntraday, IndexSeries};
pub use jobs::{QuoteRefreshReport, ReconcileReport, SnapshotReport};
pub use portfolios::PortfolioDetail;

use crate::core::config::AppConfig;
use crate::core::error::{MonitorError, Result};
use crate::core::estimate::{EstimateResult, calculate_estimate};
use crate::core::market::{MarketSources, Session, is_weekday, market_now};
use crate::core::model::{
    EstimateSnapshot, Fund, FundNav, Holding, IndexHistory, NavHistory, Quote, UNKNOWN_FUND_TYPE,
};
use crate::core::period::Period;
use crate::core::cache::TtlCache;
use crate::providers::EastmoneyProvider;
use crate::store::FundStore;
use anyhow::Context;
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Holdings kept per fund, in report order.
pub const TOP_HOLDINGS: usize = 10;

pub type Clock = Arc<dyn Fn() -> DateTime<Tz> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SetupOutcome {
    /// The fund was already tracked; nothing was fetched.
    Exists(Fund),
    Created { fund: Fund, holdings_count: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum HoldingsRefresh {
    /// A newer report replaced the stored holdings.
    Updated {
        report_date: NaiveDate,
        holdings_count: usize,
    },
    /// The upstream report is no newer than the stored one.
    Unchanged { report_date: Option<NaiveDate> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundEstimate {
    pub fund_code: String,
    pub fund_name: String,
    pub trading_day: bool,
    pub holdings_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub estimate: EstimateResult,
}

/// Today's estimate snapshots of one fund.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntradaySeries {
    pub fund_code: String,
    pub date: NaiveDate,
    pub last_nav: Option<f64>,
    pub points: Vec<EstimateSnapshot>,
}

pub struct Monitor {
    store: Arc<FundStore>,
    sources: MarketSources,
    quotes: TtlCache<String, Quote>,
    estimates: TtlCache<String, FundEstimate>,
    nav_histories: TtlCache<String, NavHistory>,
    index_histories: TtlCache<(NaiveDate, Period), IndexHistory>,
    trading_days: TtlCache<NaiveDate, bool>,
    closed_day_ttl: Duration,
    sessions: Vec<Session>,
    clock: Clock,
}

impl Monitor {
    pub fn new(store: Arc<FundStore>, sources: MarketSources, config: &AppConfig) -> Self {
        let cache = &config.cache;
        Self {
            store,
            sources,
            quotes: TtlCache::new(Duration::from_secs(cache.quote_ttl_secs)),
            estimates: TtlCache::new(Duration::from_secs(cache.estimate_ttl_secs)),
            nav_histories: TtlCache::new(Duration::from_secs(cache.nav_history_ttl_secs)),
            index_histories: TtlCache::new(Duration::from_secs(cache.nav_history_ttl_secs)),
            trading_days: TtlCache::new(Duration::from_secs(cache.trading_day_ttl_secs)),
            closed_day_ttl: Duration::from_secs(cache.closed_day_ttl_secs),
            sessions: config.scheduler.sessions.clone(),
            clock: Arc::new(market_now),
        }
    }

    /// Opens the store under the configured data path and talks to eastmoney.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let data_path = config.default_data_path()?;
        let store = FundStore::open(&data_path.join("store"))
            .with_context(|| format!("Failed to open store in {}", data_path.display()))?;
        let provider = Arc::new(EastmoneyProvider::new(&config.providers.eastmoney)?);
        Ok(Self::new(
            Arc::new(store),
            MarketSources::from_provider(provider),
            config,
        ))
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Tz> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Current exchange-local time.
    pub fn now(&self) -> DateTime<Tz> {
        (self.clock)()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Weekends are closed without asking; otherwise the oracle's verdict is
    /// cached per date. A closed verdict gets the shorter TTL, since the
    /// oracle can answer "closed" before the day's first trade.
    async fn is_trading_day(&self, date: NaiveDate) -> bool {
        if !is_weekday(date) {
            return false;
        }
        if let Some(open) = self.trading_days.get(&date).await {
            return open;
        }
        let open = self.sources.calendar.is_market_trading_today().await;
        debug!("Trading day check for {}: {}", date, open);
        let ttl = (!open).then_some(self.closed_day_ttl);
        self.trading_days.set(date, open, ttl).await;
        open
    }

    /// Quotes from the cache, with misses fetched in one request and cached.
    async fn resolve_quotes(&self, codes: &[String]) -> HashMap<String, Quote> {
        let mut quotes = self.quotes.get_many(codes).await;
        let misses: Vec<String> = codes
            .iter()
            .filter(|code| !quotes.contains_key(*code))
            .cloned()
            .collect();
        if misses.is_empty() {
            return quotes;
        }

        debug!("Fetching {} uncached quotes", misses.len());
        let fetched = self.sources.quotes.get_stock_quotes(&misses).await;
        for (code, quote) in fetched {
            self.quotes.set(code.clone(), quote.clone(), None).await;
            quotes.insert(code, quote);
        }
        quotes
    }

    async fn nav_history_of(&self, fund_code: &str) -> NavHistory {
        let key = fund_code.to_string();
        if let Some(history) = self.nav_histories.get(&key).await {
            return history;
        }
        let history = self.sources.navs.get_fund_nav_history(fund_code).await;
        // An empty answer usually means the source failed, so retry next time
        if !history.is_empty() {
            self.nav_histories.set(key, history.clone(), None).await;
        }
        history
    }

    fn require_fund(&self, fund_code: &str) -> Result<Fund> {
        self.store
            .get_fund(fund_code)?
            .ok_or_else(|| MonitorError::not_found("Fund", fund_code))
    }

    /// Starts tracking a fund: latest NAV, directory entry and top holdings.
    pub async fn setup_fund(&self, fund_code: &str) -> Result<SetupOutcome> {
        let fund_code = fund_code.trim();
        if fund_code.is_empty() {
            return Err(MonitorError::invalid("Fund code cannot be empty"));
        }
        if let Some(fund) = self.store.get_fund(fund_code)? {
            debug!("Fund {} already tracked", fund_code);
            return Ok(SetupOutcome::Exists(fund));
        }

        let nav = self
            .sources
            .navs
            .get_fund_nav(fund_code)
            .await
            .ok_or_else(|| MonitorError::not_found("Fund", fund_code))?;
        let (fund_name, fund_type) = match self.sources.info.get_fund_info(fund_code).await {
            Some(info) => (info.fund_name, info.fund_type),
            None => (format!("Fund-{fund_code}"), UNKNOWN_FUND_TYPE.to_string()),
        };
        let mut holdings = self.sources.info.get_fund_holdings(fund_code).await;
        holdings.truncate(TOP_HOLDINGS);

        let fund = Fund {
            fund_code: fund_code.to_string(),
            fund_name,
            fund_type,
            last_nav: Some(nav.nav),
            nav_date: Some(nav.nav_date),
            updated_at: self.now().naive_local(),
        };
        self.store.save_fund_with_holdings(&fund, &holdings)?;
        info!(
            "Tracking fund {} ({}) with {} holdings",
            fund.fund_code,
            fund.fund_name,
            holdings.len()
        );

        Ok(SetupOutcome::Created {
            fund,
            holdings_count: holdings.len(),
        })
    }

    pub fn fund(&self, fund_code: &str) -> Result<Fund> {
        self.require_fund(fund_code)
    }

    pub fn holdings(&self, fund_code: &str) -> Result<Vec<Holding>> {
        self.require_fund(fund_code)?;
        Ok(self.store.holdings(fund_code)?)
    }

    pub fn list_funds(&self) -> Result<Vec<Fund>> {
        Ok(self.store.list_funds()?)
    }

    /// Real-time estimate of one fund. Flat on days the market is closed.
    pub async fn estimate_fund(&self, fund_code: &str) -> Result<FundEstimate> {
        let fund = self.require_fund(fund_code)?;
        let last_nav = fund
            .last_nav
            .ok_or_else(|| MonitorError::invalid("Fund NAV not available"))?;
        let holdings = self.store.holdings(fund_code)?;
        if holdings.is_empty() {
            return Err(MonitorError::invalid("No holdings data available"));
        }

        let key = fund.fund_code.clone();
        if let Some(cached) = self.estimates.get(&key).await {
            return Ok(cached);
        }

        let trading_day = self.is_trading_day(self.now().date_naive()).await;
        let estimate = if trading_day {
            let codes: Vec<String> = holdings.iter().map(|h| h.stock_code.clone()).collect();
            let quotes = self.resolve_quotes(&codes).await;
            calculate_estimate(&holdings, &quotes, last_nav)
        } else {
            EstimateResult::flat(last_nav)
        };

        let result = FundEstimate {
            fund_code: fund.fund_code,
            fund_name: fund.fund_name,
            trading_day,
            holdings_date: holdings.first().map(|h| h.report_date),
            estimate,
        };
        self.estimates.set(key, result.clone(), None).await;
        Ok(result)
    }

    /// Pulls the latest official NAV and stores it.
    pub async fn refresh_nav(&self, fund_code: &str) -> Result<FundNav> {
        self.require_fund(fund_code)?;
        let nav = self
            .sources
            .navs
            .get_fund_nav(fund_code)
            .await
            .ok_or_else(|| MonitorError::Unavailable(format!("No NAV available for {fund_code}")))?;

        self.store
            .update_nav(fund_code, nav.nav, nav.nav_date, self.now().naive_local())?;
        self.estimates.delete(&fund_code.to_string()).await;
        info!("NAV of {} is {} as of {}", fund_code, nav.nav, nav.nav_date);
        Ok(nav)
    }

    /// Replaces the stored holdings when the source has a newer report.
    pub async fn refresh_holdings(&self, fund_code: &str) -> Result<HoldingsRefresh> {
        self.require_fund(fund_code)?;
        let mut fetched = self.sources.info.get_fund_holdings(fund_code).await;
        let Some(fetched_date) = fetched.first().map(|h| h.report_date) else {
            return Err(MonitorError::Unavailable(format!(
                "No holdings report available for {fund_code}"
            )));
        };

        let stored_date = self.store.holdings(fund_code)?.first().map(|h| h.report_date);
        if stored_date.is_some_and(|stored| stored >= fetched_date) {
            debug!("Holdings of {} already current as of {:?}", fund_code, stored_date);
            return Ok(HoldingsRefresh::Unchanged {
                report_date: stored_date,
            });
        }

        fetched.truncate(TOP_HOLDINGS);
        self.store.replace_holdings(fund_code, &fetched)?;
        self.estimates.delete(&fund_code.to_string()).await;
        info!(
            "Holdings of {} updated to the {} report ({} stocks)",
            fund_code,
            fetched_date,
            fetched.len()
        );
        Ok(HoldingsRefresh::Updated {
            report_date: fetched_date,
            holdings_count: fetched.len(),
        })
    }

    /// Official NAV series within the period, ascending by date.
    pub async fn nav_history(&self, fund_code: &str, period: Period) -> Result<NavHistory> {
        self.require_fund(fund_code)?;
        let cutoff = period.cutoff(self.now().date_naive());
        let history = self.nav_history_of(fund_code).await;
        Ok(history.range(cutoff..).map(|(d, nav)| (*d, *nav)).collect())
    }

    pub fn intraday(&self, fund_code: &str) -> Result<IntradaySeries> {
        let fund = self.require_fund(fund_code)?;
        let today = self.now().date_naive();
        Ok(IntradaySeries {
            points: self.store.estimate_snapshots_on(fund_code, today)?,
            fund_code: fund.fund_code,
            date: today,
            last_nav: fund.last_nav,
        })
    }

    /// Distinct stock codes across the given holdings lists, sorted.
    fn union_codes<'a, I>(holdings: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a Vec<Holding>>,
    {
        holdings
            .into_iter()
            .flatten()
            .map(|h| h.stock_code.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
