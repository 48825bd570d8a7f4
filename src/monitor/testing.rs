//! In-memory market and a monitor wired to it, for unit tests.

use super::Monitor;
use crate::core::config::AppConfig;
use crate::core::market::{
    FundInfoProvider, FundNavProvider, IndexProvider, MARKET_TZ, MarketSources, QuoteProvider,
    TradingCalendar,
};
use crate::core::model::{
    Fund, FundInfo, FundNav, Holding, IndexHistory, IndexTrend, NavHistory, Quote,
};
use crate::store::FundStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, hour: u32, minute: u32) -> DateTime<Tz> {
    MARKET_TZ
        .with_ymd_and_hms(y, m, d, hour, minute, 0)
        .single()
        .unwrap()
}

pub fn holding(stock_code: &str, ratio: f64) -> Holding {
    Holding {
        stock_code: stock_code.to_string(),
        stock_name: format!("Stock {stock_code}"),
        holding_ratio: ratio,
        report_date: date(2025, 12, 31),
    }
}

#[derive(Default)]
struct MarketState {
    quotes: HashMap<String, Quote>,
    navs: HashMap<String, FundNav>,
    histories: HashMap<String, NavHistory>,
    infos: HashMap<String, FundInfo>,
    holdings: HashMap<String, Vec<Holding>>,
    closed: bool,
    quote_delay: Option<Duration>,
    index_closes: IndexHistory,
    index_trend: IndexTrend,
}

#[derive(Default)]
pub struct FakeMarket {
    state: Mutex<MarketState>,
    quote_calls: AtomicUsize,
    nav_calls: AtomicUsize,
    history_calls: AtomicUsize,
    calendar_calls: AtomicUsize,
    index_calls: AtomicUsize,
    fail_next_quotes: AtomicBool,
}

impl FakeMarket {
    pub fn set_quote(&self, code: &str, price: f64, change_pct: f64) {
        self.state.lock().unwrap().quotes.insert(
            code.to_string(),
            Quote {
                price,
                change_pct,
                name: format!("Stock {code}"),
            },
        );
    }

    pub fn set_nav(&self, code: &str, nav: f64, nav_date: NaiveDate) {
        self.state.lock().unwrap().navs.insert(
            code.to_string(),
            FundNav {
                nav,
                nav_date,
                acc_nav: None,
            },
        );
    }

    pub fn set_history(&self, code: &str, points: &[(NaiveDate, f64)]) {
        self.state
            .lock()
            .unwrap()
            .histories
            .insert(code.to_string(), points.iter().copied().collect());
    }

    pub fn set_info(&self, code: &str, name: &str, fund_type: &str) {
        self.state.lock().unwrap().infos.insert(
            code.to_string(),
            FundInfo {
                fund_code: code.to_string(),
                fund_name: name.to_string(),
                fund_type: fund_type.to_string(),
            },
        );
    }

    pub fn set_holdings(&self, code: &str, holdings: Vec<Holding>) {
        self.state
            .lock()
            .unwrap()
            .holdings
            .insert(code.to_string(), holdings);
    }

    pub fn set_index_closes(&self, closes: &[(NaiveDate, f64)]) {
        self.state.lock().unwrap().index_closes = closes.iter().copied().collect();
    }

    pub fn set_index_trend(&self, trend: IndexTrend) {
        self.state.lock().unwrap().index_trend = trend;
    }

    pub fn set_trading(&self, open: bool) {
        self.state.lock().unwrap().closed = !open;
    }

    /// Quote requests take this long to answer, on the tokio clock.
    pub fn set_quote_delay(&self, delay: Duration) {
        self.state.lock().unwrap().quote_delay = Some(delay);
    }

    /// The next quote request panics, as a broken upstream parser would.
    pub fn fail_next_quote_fetch(&self) {
        self.fail_next_quotes.store(true, Ordering::SeqCst);
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn nav_calls(&self) -> usize {
        self.nav_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn calendar_calls(&self) -> usize {
        self.calendar_calls.load(Ordering::SeqCst)
    }

    pub fn index_calls(&self) -> usize {
        self.index_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteProvider for FakeMarket {
    async fn get_stock_quotes(&self, codes: &[String]) -> HashMap<String, Quote> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_quotes.swap(false, Ordering::SeqCst) {
            panic!("quote feed returned garbage");
        }
        let delay = self.state.lock().unwrap().quote_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        codes
            .iter()
            .filter_map(|code| Some((code.clone(), state.quotes.get(code)?.clone())))
            .collect()
    }
}

#[async_trait]
impl FundNavProvider for FakeMarket {
    async fn get_fund_nav(&self, fund_code: &str) -> Option<FundNav> {
        self.nav_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().navs.get(fund_code).cloned()
    }

    async fn get_fund_nav_history(&self, fund_code: &str) -> NavHistory {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .histories
            .get(fund_code)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl FundInfoProvider for FakeMarket {
    async fn get_fund_info(&self, fund_code: &str) -> Option<FundInfo> {
        self.state.lock().unwrap().infos.get(fund_code).cloned()
    }

    async fn get_fund_holdings(&self, fund_code: &str) -> Vec<Holding> {
        self.state
            .lock()
            .unwrap()
            .holdings
            .get(fund_code)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TradingCalendar for FakeMarket {
    async fn is_market_trading_today(&self) -> bool {
        self.calendar_calls.fetch_add(1, Ordering::SeqCst);
        !self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl IndexProvider for FakeMarket {
    async fn get_index_history(&self, since: NaiveDate, until: NaiveDate) -> IndexHistory {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .index_closes
            .range(since..=until)
            .map(|(d, close)| (*d, *close))
            .collect()
    }

    async fn get_index_intraday(&self) -> IndexTrend {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().index_trend.clone()
    }
}

/// A monitor over a temporary store and a [`FakeMarket`], with a settable clock.
pub struct TestEnv {
    _dir: TempDir,
    pub store: Arc<FundStore>,
    pub market: Arc<FakeMarket>,
    pub monitor: Arc<Monitor>,
    time: Arc<Mutex<DateTime<Tz>>>,
}

impl TestEnv {
    /// Wednesday 2026-02-18, 10:00 in the morning session.
    pub fn new() -> Self {
        Self::at(2026, 2, 18, 10, 0)
    }

    pub fn at(y: i32, m: u32, d: u32, hour: u32, minute: u32) -> Self {
        Self::build(at(y, m, d, hour, minute), &AppConfig::default())
    }

    /// Same Wednesday morning as [`TestEnv::new`], with custom cache or scheduler settings.
    pub fn with_config(config: &AppConfig) -> Self {
        Self::build(at(2026, 2, 18, 10, 0), config)
    }

    fn build(now: DateTime<Tz>, config: &AppConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FundStore::open(dir.path()).unwrap());
        let market = Arc::new(FakeMarket::default());
        let time = Arc::new(Mutex::new(now));

        let clock = time.clone();
        let monitor = Monitor::new(
            store.clone(),
            MarketSources::from_provider(market.clone()),
            config,
        )
        .with_clock(move || *clock.lock().unwrap());
        let monitor = Arc::new(monitor);

        Self {
            _dir: dir,
            store,
            market,
            monitor,
            time,
        }
    }

    pub fn set_time(&self, y: i32, m: u32, d: u32, hour: u32, minute: u32) {
        *self.time.lock().unwrap() = at(y, m, d, hour, minute);
    }

    /// Stores a fund directly, bypassing setup.
    pub fn track_fund(&self, code: &str, last_nav: Option<f64>, holdings: Vec<Holding>) {
        let fund = Fund {
            fund_code: code.to_string(),
            fund_name: format!("Fund {code}"),
            fund_type: "混合型".to_string(),
            last_nav,
            nav_date: last_nav.map(|_| date(2026, 2, 17)),
            updated_at: NaiveDateTime::default(),
        };
        self.store.save_fund_with_holdings(&fund, &holdings).unwrap();
    }
}
