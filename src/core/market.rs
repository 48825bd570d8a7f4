//! Market data abstractions and trading session rules.

use crate::core::model::{FundInfo, FundNav, Holding, IndexHistory, IndexTrend, NavHistory, Quote};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Exchange time zone. Sessions, snapshot dates and NAV dates are all local to it.
pub const MARKET_TZ: Tz = chrono_tz::Asia::Shanghai;

pub fn market_now() -> DateTime<Tz> {
    Utc::now().with_timezone(&MARKET_TZ)
}

/// Real-time stock quotes. Unknown codes are simply absent from the result
/// and connectivity failures yield an empty map.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn get_stock_quotes(&self, codes: &[String]) -> HashMap<String, Quote>;
}

#[async_trait]
pub trait FundNavProvider: Send + Sync {
    async fn get_fund_nav(&self, fund_code: &str) -> Option<FundNav>;
    async fn get_fund_nav_history(&self, fund_code: &str) -> NavHistory;
}

#[async_trait]
pub trait FundInfoProvider: Send + Sync {
    async fn get_fund_info(&self, fund_code: &str) -> Option<FundInfo>;
    /// Latest disclosed top holdings, empty when unavailable.
    async fn get_fund_holdings(&self, fund_code: &str) -> Vec<Holding>;
}

/// Whether the exchange is open today. Implementations should answer `true`
/// when they cannot tell; weekends are filtered out before they are asked.
#[async_trait]
pub trait TradingCalendar: Send + Sync {
    async fn is_market_trading_today(&self) -> bool;
}

/// The CSI 300 benchmark that fund charts are compared against. Failures
/// yield empty results.
#[async_trait]
pub trait IndexProvider: Send + Sync {
    /// Daily closes from `since` through `until`, both inclusive.
    async fn get_index_history(&self, since: NaiveDate, until: NaiveDate) -> IndexHistory;
    async fn get_index_intraday(&self) -> IndexTrend;
}

/// The data sources a monitor talks to.
#[derive(Clone)]
pub struct MarketSources {
    pub quotes: Arc<dyn QuoteProvider>,
    pub navs: Arc<dyn FundNavProvider>,
    pub info: Arc<dyn FundInfoProvider>,
    pub calendar: Arc<dyn TradingCalendar>,
    pub index: Arc<dyn IndexProvider>,
}

impl MarketSources {
    /// Uses one provider for every concern.
    pub fn from_provider<P>(provider: Arc<P>) -> Self
    where
        P: QuoteProvider
            + FundNavProvider
            + FundInfoProvider
            + TradingCalendar
            + IndexProvider
            + 'static,
    {
        Self {
            quotes: provider.clone(),
            navs: provider.clone(),
            info: provider.clone(),
            calendar: provider.clone(),
            index: provider,
        }
    }
}

/// A continuous trading window in exchange-local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl Session {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }
}

/// Morning and afternoon sessions with five minutes of slack on each side.
pub fn default_sessions() -> Vec<Session> {
    vec![
        Session::new(hm(9, 25), hm(11, 35)),
        Session::new(hm(12, 55), hm(15, 5)),
    ]
}

pub(crate) fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_trading_hours(now: &DateTime<Tz>, sessions: &[Session]) -> bool {
    if !is_weekday(now.date_naive()) {
        return false;
    }
    let time = now.time();
    sessions.iter().any(|session| session.contains(time))
}

/// Next weekday instant strictly after `now` whose local time is `at`.
pub fn next_daily_run(now: DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    for offset in 0..=7 {
        let date = now.date_naive() + Duration::days(offset);
        if !is_weekday(date) {
            continue;
        }
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(at)).earliest()
            && candidate > now
        {
            return candidate;
        }
    }
    now + Duration::days(1)
}

/// `HH:MM` (de)serialization for wall-clock times in config files.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(text.trim(), FORMAT).map_err(serde::de::Error::custom)
    }
}
