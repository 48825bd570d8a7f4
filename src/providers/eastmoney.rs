//! Market data from the public eastmoney endpoints.
//!
//! Every call is best effort: transport errors, timeouts and malformed
//! payloads are logged and surface as "no data" to the caller.

use crate::core::config::EastmoneyProviderConfig;
use crate::core::market::{
    FundInfoProvider, FundNavProvider, IndexProvider, MARKET_TZ, QuoteProvider, TradingCalendar,
    market_now,
};
use crate::core::model::{
    FundInfo, FundNav, Holding, IndexHistory, IndexPoint, IndexTrend, NavHistory, Quote,
    UNKNOWN_FUND_TYPE,
};
use crate::providers::util::{build_client, js_string, js_var, secid_for, strip_tags, with_retry};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_HOLDINGS: usize = 10;
const RETRY_DELAY_MS: u64 = 200;
/// CSI 300 on the Shanghai exchange.
const BENCHMARK_SECID: &str = "1.000300";

pub struct EastmoneyProvider {
    client: reqwest::Client,
    config: EastmoneyProviderConfig,
}

impl EastmoneyProvider {
    pub fn new(config: &EastmoneyProviderConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            config: config.clone(),
        })
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        debug!("Requesting {}", url);
        with_retry(
            || async {
                self.client
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await
            },
            self.config.retries,
            RETRY_DELAY_MS,
        )
        .await
        .with_context(|| format!("Request failed: {url}"))
    }

    async fn fetch_nav_script(&self, fund_code: &str) -> Result<String> {
        let url = format!(
            "{}/pingzhongdata/{}.js",
            self.config.fund_base_url, fund_code
        );
        self.fetch_text(&url).await
    }

    async fn fetch_nav_points(&self, fund_code: &str) -> Result<Vec<NavPoint>> {
        let script = self.fetch_nav_script(fund_code).await?;
        parse_nav_points(&script)
    }

    async fn fetch_quotes(&self, codes: &[String]) -> Result<HashMap<String, Quote>> {
        let secids: Vec<String> = codes.iter().filter_map(|code| secid_for(code)).collect();
        if secids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!(
            "{}/api/qt/ulist.np/get?fltt=2&fields=f2,f3,f12,f14&secids={}",
            self.config.quote_base_url,
            secids.join(",")
        );
        let body = self.fetch_text(&url).await?;
        let response: QuoteListResponse =
            serde_json::from_str(&body).context("Failed to parse quote response")?;
        Ok(response.into_quotes())
    }

    async fn lookup_fund_directory(&self, fund_code: &str) -> Result<Option<FundInfo>> {
        let url = format!("{}/js/fundcode_search.js", self.config.fund_base_url);
        let script = self.fetch_text(&url).await?;
        parse_fund_directory(&script, fund_code)
    }

    async fn fetch_holdings(&self, fund_code: &str) -> Result<Vec<Holding>> {
        let url = format!(
            "{}/FundArchivesDatas.aspx?type=jjcc&code={}&topline={}",
            self.config.archive_base_url, fund_code, MAX_HOLDINGS
        );
        let body = self.fetch_text(&url).await?;
        parse_holdings_report(&body)
    }

    async fn fetch_last_trade_date(&self) -> Result<Option<NaiveDate>> {
        let url = format!(
            "{}/api/qt/stock/get?secid=1.000001&fields=f86",
            self.config.quote_base_url
        );
        let body = self.fetch_text(&url).await?;
        let response: TradeStatusResponse =
            serde_json::from_str(&body).context("Failed to parse index status")?;
        Ok(response
            .data
            .and_then(|data| data.f86)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|ts| ts.with_timezone(&MARKET_TZ).date_naive()))
    }

    async fn fetch_index_closes(&self, since: NaiveDate, until: NaiveDate) -> Result<IndexHistory> {
        let url = format!(
            "{}/api/qt/stock/kline/get?secid={}&fields1=f1,f2,f3&fields2=f51,f52&klt=101&fqt=1&beg={}&end={}",
            self.config.history_base_url,
            BENCHMARK_SECID,
            since.format("%Y%m%d"),
            until.format("%Y%m%d")
        );
        let body = self.fetch_text(&url).await?;
        let response: KlineResponse =
            serde_json::from_str(&body).context("Failed to parse index klines")?;
        Ok(response
            .data
            .map(|data| parse_kline_closes(&data.klines))
            .unwrap_or_default())
    }

    async fn fetch_index_trend(&self) -> Result<IndexTrend> {
        let url = format!(
            "{}/api/qt/stock/trends2/get?secid={}&fields1=f1,f2,f3&fields2=f51,f52,f53&iscr=0&ndays=1",
            self.config.quote_base_url, BENCHMARK_SECID
        );
        let body = self.fetch_text(&url).await?;
        let response: TrendsResponse =
            serde_json::from_str(&body).context("Failed to parse index trends")?;
        let Some(data) = response.data else {
            return Ok(IndexTrend::default());
        };
        Ok(IndexTrend {
            pre_close: value_as_f64(&data.pre_close),
            points: parse_trend_points(&data.trends),
        })
    }
}

#[async_trait]
impl QuoteProvider for EastmoneyProvider {
    async fn get_stock_quotes(&self, codes: &[String]) -> HashMap<String, Quote> {
        match self.fetch_quotes(codes).await {
            Ok(quotes) => {
                debug!("Fetched {}/{} stock quotes", quotes.len(), codes.len());
                quotes
            }
            Err(e) => {
                warn!("Failed to fetch stock quotes: {:#}", e);
                HashMap::new()
            }
        }
    }
}

#[async_trait]
impl FundNavProvider for EastmoneyProvider {
    async fn get_fund_nav(&self, fund_code: &str) -> Option<FundNav> {
        match self.fetch_nav_points(fund_code).await {
            Ok(points) => points.into_iter().last().map(|point| FundNav {
                nav: point.nav,
                nav_date: point.date,
                acc_nav: point.acc_nav,
            }),
            Err(e) => {
                warn!("Failed to fetch NAV for {}: {:#}", fund_code, e);
                None
            }
        }
    }

    async fn get_fund_nav_history(&self, fund_code: &str) -> NavHistory {
        match self.fetch_nav_points(fund_code).await {
            Ok(points) => points.into_iter().map(|point| (point.date, point.nav)).collect(),
            Err(e) => {
                warn!("Failed to fetch NAV history for {}: {:#}", fund_code, e);
                NavHistory::new()
            }
        }
    }
}

#[async_trait]
impl FundInfoProvider for EastmoneyProvider {
    async fn get_fund_info(&self, fund_code: &str) -> Option<FundInfo> {
        match self.lookup_fund_directory(fund_code).await {
            Ok(Some(info)) => return Some(info),
            Ok(None) => debug!("Fund {} not in directory", fund_code),
            Err(e) => warn!("Failed to read fund directory: {:#}", e),
        }

        // The NAV script still names the fund, just without a type
        let script = match self.fetch_nav_script(fund_code).await {
            Ok(script) => script,
            Err(e) => {
                warn!("Failed to fetch fund info for {}: {:#}", fund_code, e);
                return None;
            }
        };
        js_string(&script, "fS_name").map(|fund_name| FundInfo {
            fund_code: fund_code.to_string(),
            fund_name,
            fund_type: UNKNOWN_FUND_TYPE.to_string(),
        })
    }

    async fn get_fund_holdings(&self, fund_code: &str) -> Vec<Holding> {
        match self.fetch_holdings(fund_code).await {
            Ok(holdings) => holdings,
            Err(e) => {
                warn!("Failed to fetch holdings for {}: {:#}", fund_code, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl TradingCalendar for EastmoneyProvider {
    async fn is_market_trading_today(&self) -> bool {
        let today = market_now().date_naive();
        match self.fetch_last_trade_date().await {
            Ok(Some(last_trade)) => last_trade == today,
            Ok(None) => {
                warn!("Index status carried no trade time, assuming market is open");
                true
            }
            Err(e) => {
                warn!("Trading day check failed, assuming market is open: {:#}", e);
                true
            }
        }
    }
}

#[async_trait]
impl IndexProvider for EastmoneyProvider {
    async fn get_index_history(&self, since: NaiveDate, until: NaiveDate) -> IndexHistory {
        match self.fetch_index_closes(since, until).await {
            Ok(closes) => {
                debug!("Fetched {} index closes since {}", closes.len(), since);
                closes
            }
            Err(e) => {
                warn!("Failed to fetch index history: {:#}", e);
                IndexHistory::new()
            }
        }
    }

    async fn get_index_intraday(&self) -> IndexTrend {
        self.fetch_index_trend().await.unwrap_or_else(|e| {
            warn!("Failed to fetch index trend: {:#}", e);
            IndexTrend::default()
        })
    }
}

#[derive(Debug, Deserialize)]
struct QuoteListResponse {
    data: Option<QuoteListData>,
}

#[derive(Debug, Deserialize)]
struct QuoteListData {
    #[serde(default)]
    diff: Value,
}

#[derive(Debug, Deserialize)]
struct QuoteItem {
    #[serde(default)]
    f2: Value,
    #[serde(default)]
    f3: Value,
    #[serde(default)]
    f12: Value,
    #[serde(default)]
    f14: Value,
}

impl QuoteListResponse {
    fn into_quotes(self) -> HashMap<String, Quote> {
        let Some(data) = self.data else {
            return HashMap::new();
        };
        // `diff` is a list, or an index-keyed object on some gateways
        let items: Vec<Value> = match data.diff {
            Value::Array(items) => items,
            Value::Object(map) => map.into_iter().map(|(_, item)| item).collect(),
            _ => Vec::new(),
        };

        items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<QuoteItem>(item).ok())
            .filter_map(|item| {
                let code = value_as_string(&item.f12)?;
                let price = value_as_f64(&item.f2)?;
                let change_pct = value_as_f64(&item.f3)?;
                Some((
                    code,
                    Quote {
                        price,
                        change_pct,
                        name: value_as_string(&item.f14).unwrap_or_default(),
                    },
                ))
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct TradeStatusResponse {
    data: Option<TradeStatusData>,
}

#[derive(Debug, Deserialize)]
struct TradeStatusData {
    f86: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TrendsResponse {
    data: Option<TrendsData>,
}

#[derive(Debug, Deserialize)]
struct TrendsData {
    #[serde(default, rename = "preClose")]
    pre_close: Value,
    #[serde(default)]
    trends: Vec<String>,
}

/// Klines are `"date,close"`; lines that do not parse are dropped.
fn parse_kline_closes(klines: &[String]) -> IndexHistory {
    klines
        .iter()
        .filter_map(|line| {
            let mut fields = line.split(',');
            let date = NaiveDate::parse_from_str(fields.next()?.trim(), "%Y-%m-%d").ok()?;
            let close = fields.next()?.trim().parse().ok()?;
            Some((date, close))
        })
        .collect()
}

/// Trends are `"YYYY-MM-DD HH:MM,price,average"`.
fn parse_trend_points(trends: &[String]) -> Vec<IndexPoint> {
    trends
        .iter()
        .filter_map(|line| {
            let mut fields = line.split(',');
            let time = NaiveDateTime::parse_from_str(fields.next()?.trim(), "%Y-%m-%d %H:%M").ok()?;
            let price = fields.next()?.trim().parse().ok()?;
            Some(IndexPoint { time, price })
        })
        .collect()
}

/// Numbers arrive either as JSON numbers or as strings; `"-"` means no trade.
fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct NavPoint {
    date: NaiveDate,
    nav: f64,
    acc_nav: Option<f64>,
}

fn market_date_from_millis(millis: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(millis).map(|ts| ts.with_timezone(&MARKET_TZ).date_naive())
}

/// Unit NAV series of a `pingzhongdata` script, ascending by date, with the
/// accumulated NAV of the same day attached when published.
fn parse_nav_points(script: &str) -> Result<Vec<NavPoint>> {
    let unit_raw =
        js_var(script, "Data_netWorthTrend").ok_or_else(|| anyhow!("No NAV series in script"))?;
    let unit: Vec<Value> =
        serde_json::from_str(unit_raw).context("Failed to parse Data_netWorthTrend")?;

    let accumulated: HashMap<i64, f64> = js_var(script, "Data_ACWorthTrend")
        .and_then(|raw| serde_json::from_str::<Vec<Value>>(raw).ok())
        .unwrap_or_default()
        .iter()
        .filter_map(|item| match item {
            Value::Array(pair) if pair.len() >= 2 => {
                Some((pair[0].as_i64()?, value_as_f64(&pair[1])?))
            }
            Value::Object(obj) => Some((
                obj.get("x")?.as_i64()?,
                value_as_f64(obj.get("y")?)?,
            )),
            _ => None,
        })
        .collect();

    let mut points: Vec<NavPoint> = unit
        .iter()
        .filter_map(|item| {
            let x = item.get("x")?.as_i64()?;
            let nav = value_as_f64(item.get("y")?)?;
            Some(NavPoint {
                date: market_date_from_millis(x)?,
                nav,
                acc_nav: accumulated.get(&x).copied(),
            })
        })
        .collect();
    points.sort_by_key(|point| point.date);
    points.dedup_by_key(|point| point.date);
    Ok(points)
}

/// Finds one code in `fundcode_search.js`, whose rows are
/// `[code, pinyin abbreviation, name, type, pinyin]`.
fn parse_fund_directory(script: &str, fund_code: &str) -> Result<Option<FundInfo>> {
    let re = Regex::new(r"(?s)var\s+r\s*=\s*(\[.*\])")?;
    let Some(raw) = re.captures(script).and_then(|caps| caps.get(1)) else {
        return Err(anyhow!("No fund list in directory script"));
    };
    let rows: Vec<Vec<String>> =
        serde_json::from_str(raw.as_str()).context("Failed to parse fund directory")?;

    Ok(rows
        .into_iter()
        .find(|row| row.first().map(String::as_str) == Some(fund_code))
        .and_then(|row| {
            let fund_name = row.get(2)?.trim().to_string();
            if fund_name.is_empty() {
                return None;
            }
            let fund_type = row
                .get(3)
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .unwrap_or(UNKNOWN_FUND_TYPE)
                .to_string();
            Some(FundInfo {
                fund_code: fund_code.to_string(),
                fund_name,
                fund_type,
            })
        }))
}

/// Top holdings of the most recent report in a `jjcc` archive page.
///
/// The page lists one block per quarter, newest first, each headed by
/// `截止至：<font ...>YYYY-MM-DD</font>`. Rows carry the stock code in the
/// second cell, its name in the third and the share of net assets as the
/// first cell ending in `%`.
fn parse_holdings_report(body: &str) -> Result<Vec<Holding>> {
    const MARKER: &str = "截止至";

    let Some(start) = body.find(MARKER) else {
        debug!("Archive page lists no reports");
        return Ok(Vec::new());
    };
    let rest = &body[start + MARKER.len()..];
    let block = match rest.find(MARKER) {
        Some(end) => &rest[..end],
        None => rest,
    };

    let date_re = Regex::new(r"<font[^>]*>\s*(\d{4}-\d{2}-\d{2})\s*</font>")?;
    let report_date = date_re
        .captures(block)
        .and_then(|caps| caps.get(1))
        .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok())
        .ok_or_else(|| anyhow!("Holdings report carries no date"))?;

    let row_re = Regex::new(r"(?s)<tr[^>]*>(.*?)</tr>")?;
    let cell_re = Regex::new(r"(?s)<td[^>]*>(.*?)</td>")?;

    let holdings = row_re
        .captures_iter(block)
        .filter_map(|row| {
            let cells: Vec<String> = cell_re
                .captures_iter(row.get(1)?.as_str())
                .filter_map(|cell| cell.get(1).map(|m| strip_tags(m.as_str())))
                .collect();
            if cells.len() < 3 {
                return None;
            }
            let ratio_pct: f64 = cells
                .iter()
                .skip(3)
                .find_map(|cell| cell.strip_suffix('%'))?
                .trim()
                .parse()
                .ok()?;
            Some(Holding {
                stock_code: cells[1].clone(),
                stock_name: cells[2].clone(),
                holding_ratio: ratio_pct / 100.0,
                report_date,
            })
        })
        .take(MAX_HOLDINGS)
        .collect();
    Ok(holdings)
}
