//! Alpha Vantage time-series adapter.
//!
//! # API Documentation
//! <https://www.alphavantage.co/documentation/#time-series-data>
//!
//! # Response Shape
//! ```json
//! {
//!   "Meta Data": {"2. Symbol": "IBM", "6. Time Zone": "US/Eastern", ...},
//!   "Time Series (5min)": {
//!     "2024-01-02 16:00:00": {"1. open": "..", "2. high": "..", "3. low": "..",
//!                             "4. close": "..", "5. volume": ".."}
//!   }
//! }
//! ```
//!
//! Timestamps are wall-clock times in the meta time zone. Errors and
//! throttling arrive with HTTP 200 under "Error Message", "Note" or
//! "Information".

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use screener_common::DataConfig;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

use super::provider::{BarProvider, ProviderError};
use super::rate_limiter::{RateLimiter, SharedRateLimiter};
use super::{normalize_bars, Bar, BarWindow, Interval};

// ============================================================================
// Constants
// ============================================================================

/// Default API host
pub const ALPHA_VANTAGE_API_BASE: &str = "https://www.alphavantage.co";

/// Time zone assumed when the meta block does not name one
pub const DEFAULT_TIME_ZONE: &str = "US/Eastern";

const QUERY_ENDPOINT: &str = "/query";

const TIMESTAMP_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_LAYOUT: &str = "%Y-%m-%d";

/// Free tier throttles per minute
const RATE_LIMIT_RETRY_SECS: u64 = 60;

fn series_function(interval: Interval) -> &'static str {
    match interval {
        Interval::Daily => "TIME_SERIES_DAILY",
        Interval::Weekly => "TIME_SERIES_WEEKLY",
        _ => "TIME_SERIES_INTRADAY",
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Alpha Vantage adapter.
pub struct AlphaVantageProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    rate_limiter: SharedRateLimiter,
}

impl AlphaVantageProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        rate_limit_rpm: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            rate_limiter: RateLimiter::shared("alphavantage", rate_limit_rpm),
        }
    }

    pub fn from_config(config: &DataConfig, api_key: &str) -> Self {
        Self::new(
            api_key,
            config.alpha_vantage_base_url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.rate_limit_rpm,
        )
    }
}

#[async_trait]
impl BarProvider for AlphaVantageProvider {
    fn name(&self) -> &'static str {
        "alphavantage"
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
        window: &BarWindow,
    ) -> Result<Vec<Bar>, ProviderError> {
        let url = format!("{}{}", self.base_url, QUERY_ENDPOINT);
        let mut query = vec![
            ("function", series_function(interval).to_string()),
            ("symbol", symbol.trim().to_string()),
            ("outputsize", "full".to_string()),
            ("datatype", "json".to_string()),
        ];
        if interval.is_intraday() {
            query.push(("interval", interval.to_string()));
        }

        self.rate_limiter.acquire().await;

        debug!(symbol = symbol, interval = %interval, "Fetching time series from Alpha Vantage");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::Auth("API key rejected".into()));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }

        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Failed to parse response: {}", e)))?;

        let bars = parse_time_series(symbol, interval, &body)?;
        Ok(normalize_bars(bars, window))
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Find a value whose key ends with `suffix` ("2. Symbol" matches "Symbol").
fn lookup<'a>(map: &'a Map<String, Value>, suffix: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.ends_with(suffix))
        .map(|(_, v)| v)
}

/// Numbered field lookup: "1. open" for "open". Exact name match after the
/// number so that "5. adjusted close" never stands in for "4. close".
fn field(entry: &Map<String, Value>, name: &str) -> Option<f64> {
    entry
        .iter()
        .find(|(k, _)| k.split_once(". ").map(|(_, n)| n) == Some(name))
        .and_then(|(_, v)| match v {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        })
}

fn localize(raw: &str, tz: Option<Tz>) -> Result<DateTime<Utc>, ProviderError> {
    let naive = NaiveDateTime::parse_from_str(raw, TIMESTAMP_LAYOUT)
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, DATE_LAYOUT).map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|e| ProviderError::Parse(format!("Invalid timestamp {:?}: {}", raw, e)))?;

    match tz {
        Some(tz) => tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| ProviderError::Parse(format!("Nonexistent local time {:?}", raw))),
        None => Ok(Utc.from_utc_datetime(&naive)),
    }
}

/// Parse an Alpha Vantage time-series document into bars.
///
/// Also used for local feed files, which share the shape.
pub fn parse_time_series(
    symbol: &str,
    interval: Interval,
    body: &Value,
) -> Result<Vec<Bar>, ProviderError> {
    let Some(root) = body.as_object() else {
        return Err(ProviderError::Parse("Expected a JSON object".into()));
    };

    if let Some(msg) = root.get("Error Message").and_then(Value::as_str) {
        // Key problems share the field with unknown-symbol errors
        if msg.to_ascii_lowercase().contains("apikey") {
            return Err(ProviderError::Auth(msg.to_string()));
        }
        return Err(ProviderError::DataNotAvailable(format!("{}: {}", symbol, msg)));
    }

    let series = root
        .iter()
        .find(|(k, _)| k.contains("Time Series"))
        .and_then(|(_, v)| v.as_object());

    let Some(series) = series else {
        if root.contains_key("Note") || root.contains_key("Information") {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }
        return Ok(Vec::new());
    };

    let meta = root.get("Meta Data").and_then(Value::as_object);
    let tz_label = meta
        .and_then(|m| lookup(m, "Time Zone"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_TIME_ZONE)
        .to_string();
    let tz = tz_label.parse::<Tz>().ok();
    if tz.is_none() {
        debug!(timezone = %tz_label, "Unknown time zone, reading timestamps as UTC");
    }

    let mut bars = Vec::with_capacity(series.len());
    for (raw_ts, entry) in series {
        let Some(entry) = entry.as_object() else {
            return Err(ProviderError::Parse(format!("Entry {} is not an object", raw_ts)));
        };
        let (Some(open), Some(high), Some(low), Some(close)) = (
            field(entry, "open"),
            field(entry, "high"),
            field(entry, "low"),
            field(entry, "close"),
        ) else {
            return Err(ProviderError::Parse(format!("Entry {} is missing prices", raw_ts)));
        };

        bars.push(Bar {
            symbol: symbol.to_string(),
            interval,
            timestamp: localize(raw_ts, tz)?,
            timezone: Some(tz_label.clone()),
            open,
            high,
            low,
            close,
            volume: field(entry, "volume").unwrap_or(0.0),
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

// ============================================================================
// Tests
// ============================================================================
