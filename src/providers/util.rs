use anyhow::{Context, Error, Result};
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retries an async operation with configurable attempts and delays
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful result or the error after all attempts
pub async fn with_retry<F, Fut, T>(mut operation: F, retries: usize, delay_ms: u64) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await.map_err(anyhow::Error::from) {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// HTTP client for the eastmoney endpoints. Every request is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
    );
    headers.insert(
        REFERER,
        HeaderValue::from_static("https://fund.eastmoney.com/"),
    );

    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36")
        .default_headers(headers)
        .build()
        .context("Failed to build HTTP client")
}

/// Exchange-qualified id used by the quote endpoints: `1.` for Shanghai,
/// `0.` for Shenzhen. Other markets are not supported.
pub fn secid_for(stock_code: &str) -> Option<String> {
    match stock_code.chars().next()? {
        '6' | '9' => Some(format!("1.{stock_code}")),
        '0' | '3' | '2' => Some(format!("0.{stock_code}")),
        _ => None,
    }
}

/// Raw right-hand side of `var <name> = ...;` in a script payload.
pub fn js_var<'a>(script: &'a str, name: &str) -> Option<&'a str> {
    let pattern = format!(r"(?s)var\s+{}\s*=\s*(.*?);", regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    re.captures(script)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Value of a string literal assigned with `var <name> = "...";`.
pub fn js_string(script: &str, name: &str) -> Option<String> {
    let raw = js_var(script, name)?;
    let value: String = serde_json::from_str(raw).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Drops markup and collapses the `&nbsp;` entities eastmoney pads cells with.
pub fn strip_tags(html: &str) -> String {
    Regex::new(r"<[^>]*>")
        .map(|re| re.replace_all(html, "").into_owned())
        .unwrap_or_else(|_| html.to_string())
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}
