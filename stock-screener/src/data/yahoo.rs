//! Yahoo Finance chart API adapter.
//!
//! # Endpoint
//! `GET {base}/v8/finance/chart/{symbol}?interval=1d&period1=..&period2=..`
//!
//! The response carries parallel arrays (`timestamp`, `indicators.quote[0]`)
//! where any entry may be `null` for bars the exchange did not report.
//! Entries with a `null` close are skipped; other `null` fields become `0.0`.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use screener_common::DataConfig;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::provider::{BarProvider, ProviderError};
use super::rate_limiter::{RateLimiter, SharedRateLimiter};
use super::{normalize_bars, Bar, BarWindow, Interval};

// ============================================================================
// Constants
// ============================================================================

/// Default chart API host
pub const YAHOO_API_BASE: &str = "https://query2.finance.yahoo.com";

/// Chart endpoint prefix
const CHART_ENDPOINT: &str = "/v8/finance/chart";

/// The chart API rejects requests without a browser-like user agent
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";

const RATE_LIMIT_RETRY_SECS: u64 = 30;

/// Index listings write share classes with a dot ("BRK.B"); Yahoo uses a dash.
fn yahoo_symbol(symbol: &str) -> String {
    symbol.trim().replace('.', "-")
}

// ============================================================================
// Adapter
// ============================================================================

/// Yahoo Finance chart adapter.
pub struct YahooChartProvider {
    base_url: String,
    client: reqwest::Client,
    rate_limiter: SharedRateLimiter,
}

impl YahooChartProvider {
    /// Create an adapter against `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>, timeout: Duration, rate_limit_rpm: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            rate_limiter: RateLimiter::shared("yahoo", rate_limit_rpm),
        }
    }

    pub fn from_config(config: &DataConfig) -> Self {
        Self::new(
            config.yahoo_base_url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.rate_limit_rpm,
        )
    }
}

#[async_trait]
impl BarProvider for YahooChartProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
        window: &BarWindow,
    ) -> Result<Vec<Bar>, ProviderError> {
        let url = format!("{}{}/{}", self.base_url, CHART_ENDPOINT, yahoo_symbol(symbol));
        let query = [
            ("interval", interval.yahoo_interval().to_string()),
            ("period1", window.start.timestamp().to_string()),
            ("period2", window.end.timestamp().to_string()),
            ("includePrePost", "false".to_string()),
        ];

        self.rate_limiter.acquire().await;

        debug!(url = %url, symbol = symbol, interval = %interval, "Fetching chart from Yahoo");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::Auth(format!("HTTP {}", status)));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }

        let body = response
            .text()
            .await
            .map_err(ProviderError::from_transport)?;

        // Unknown symbols come back as 404 with a chart.error body
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        let bars = parse_chart(symbol, interval, &body)?;
        Ok(normalize_bars(bars, window))
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Option<ChartIndicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    exchange_timezone_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn value_at(values: &[Option<f64>], i: usize) -> f64 {
    values.get(i).copied().flatten().unwrap_or(0.0)
}

/// Parse a chart API body into bars, in response order.
pub fn parse_chart(symbol: &str, interval: Interval, body: &str) -> Result<Vec<Bar>, ProviderError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("Failed to parse chart response: {}", e)))?;

    if let Some(err) = envelope.chart.error {
        let detail = err.description.unwrap_or_else(|| err.code.clone());
        return Err(if err.code.eq_ignore_ascii_case("Not Found") {
            ProviderError::DataNotAvailable(format!("{}: {}", symbol, detail))
        } else {
            ProviderError::InvalidRequest(format!("{}: {}", err.code, detail))
        });
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let timezone = result.meta.and_then(|m| m.exchange_timezone_name);
    let quote = result
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .unwrap_or_default();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(close) = quote.close.get(i).copied().flatten() else {
            continue;
        };
        let Some(timestamp) = Utc.timestamp_opt(ts, 0).single() else {
            return Err(ProviderError::Parse(format!("Invalid timestamp: {}", ts)));
        };

        bars.push(Bar {
            symbol: symbol.to_string(),
            interval,
            timestamp,
            timezone: timezone.clone(),
            open: value_at(&quote.open, i),
            high: value_at(&quote.high, i),
            low: value_at(&quote.low, i),
            close,
            volume: value_at(&quote.volume, i),
        });
    }

    Ok(bars)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const CHART_BODY: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "AAPL", "exchangeTimezoneName": "America/New_York"},
                "timestamp": [1704205800, 1704292200, 1704378600],
                "indicators": {"quote": [{
                    "open":   [187.15, null, 182.15],
                    "high":   [188.44, 185.88, null],
                    "low":    [183.89, 183.43, 180.88],
                    "close":  [185.64, null, 181.91],
                    "volume": [82488700, 58414500, null]
                }]}
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_chart_skips_null_close() {
        let bars = parse_chart("AAPL", Interval::Daily, CHART_BODY).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 185.64);
        assert_eq!(bars[0].timezone.as_deref(), Some("America/New_York"));
        assert_eq!(bars[0].timestamp.timestamp(), 1704205800);
        assert_eq!(bars[1].close, 181.91);
        assert_eq!(bars[1].high, 0.0);
        assert_eq!(bars[1].volume, 0.0);
    }

    #[test]
    fn test_parse_chart_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart("ZZZZ", Interval::Daily, body).unwrap_err();
        assert!(err.is_no_data());
    }

    #[test]
    fn test_parse_chart_empty_result() {
        let body = r#"{"chart":{"result":[{"meta":{},"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(parse_chart("AAPL", Interval::Daily, body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_chart_garbage() {
        let err = parse_chart("AAPL", Interval::Daily, "<html>").unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[test]
    fn test_yahoo_symbol() {
        assert_eq!(yahoo_symbol("BRK.B"), "BRK-B");
        assert_eq!(yahoo_symbol(" AAPL "), "AAPL");
    }
}
