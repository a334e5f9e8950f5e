//! Market data module for US equities.
//!
//! Provides the OHLCV bar model and the providers that fetch bars for a
//! symbol over a time window.
//!
//! # Data Sources
//! - **Yahoo** (default): chart API, daily and intraday bars, no key required
//! - **Alpha Vantage**: time-series API, requires an API key
//! - **Local**: Alpha Vantage shaped JSON files on disk, for offline runs

mod alphavantage;
mod local_file;
mod provider;
mod rate_limiter;
mod yahoo;

pub use alphavantage::{parse_time_series, AlphaVantageProvider, DEFAULT_TIME_ZONE};
pub use local_file::LocalFileProvider;
pub use provider::{build_provider, BarProvider, ProviderError};
pub use rate_limiter::{RateLimiter, SharedRateLimiter};
pub use yahoo::{parse_chart, YahooChartProvider};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Data Types
// ============================================================================

/// Bar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// 1-minute bars
    M1,
    /// 5-minute bars
    M5,
    /// 15-minute bars
    M15,
    /// 30-minute bars
    M30,
    /// 60-minute bars
    H1,
    /// Daily bars
    Daily,
    /// Weekly bars
    Weekly,
}

impl Interval {
    /// Parse from string (e.g., "5min", "1d", "daily", "1wk").
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "1min" | "1m" | "m1" => Some(Self::M1),
            "5min" | "5m" | "m5" => Some(Self::M5),
            "15min" | "15m" | "m15" => Some(Self::M15),
            "30min" | "30m" | "m30" => Some(Self::M30),
            "60min" | "60m" | "1h" | "h1" => Some(Self::H1),
            "1d" | "d" | "daily" => Some(Self::Daily),
            "1wk" | "1w" | "w" | "weekly" => Some(Self::Weekly),
            _ => None,
        }
    }

    /// Whether bars of this interval are finer than a trading day.
    pub fn is_intraday(&self) -> bool {
        !matches!(self, Self::Daily | Self::Weekly)
    }

    /// Nominal length of one bar.
    pub fn duration(&self) -> Duration {
        match self {
            Self::M1 => Duration::minutes(1),
            Self::M5 => Duration::minutes(5),
            Self::M15 => Duration::minutes(15),
            Self::M30 => Duration::minutes(30),
            Self::H1 => Duration::hours(1),
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::weeks(1),
        }
    }

    /// Interval parameter for the Yahoo chart API.
    pub fn yahoo_interval(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "60m",
            Self::Daily => "1d",
            Self::Weekly => "1wk",
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::M1 => write!(f, "1min"),
            Self::M5 => write!(f, "5min"),
            Self::M15 => write!(f, "15min"),
            Self::M30 => write!(f, "30min"),
            Self::H1 => write!(f, "60min"),
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
        }
    }
}

/// A single OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Ticker symbol
    pub symbol: String,
    /// Bar interval
    pub interval: Interval,
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    /// IANA time zone of the exchange the bar was reported in
    #[serde(default)]
    pub timezone: Option<String>,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume
    pub volume: f64,
}

/// Half-open time window `[start, end)` for bar requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BarWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window covering the last `days` calendar days up to now.
    pub fn last_days(days: u32) -> Self {
        Self::ending_at(Utc::now(), days)
    }

    /// Window covering `days` calendar days before `end`.
    pub fn ending_at(end: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Drop bars outside `window`, sort ascending by time and keep the first
/// bar for each timestamp.
pub fn normalize_bars(mut bars: Vec<Bar>, window: &BarWindow) -> Vec<Bar> {
    bars.retain(|b| window.contains(b.timestamp));
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    bars
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar_at(ts: DateTime<Utc>, close: f64) -> Bar {
        Bar {
            symbol: "AAA".into(),
            interval: Interval::Daily,
            timestamp: ts,
            timezone: None,
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!(Interval::parse("5min"), Some(Interval::M5));
        assert_eq!(Interval::parse("1D"), Some(Interval::Daily));
        assert_eq!(Interval::parse("daily"), Some(Interval::Daily));
        assert_eq!(Interval::parse("1wk"), Some(Interval::Weekly));
        assert_eq!(Interval::parse("60m"), Some(Interval::H1));
        assert_eq!(Interval::parse("3min"), None);
    }

    #[test]
    fn test_interval_display_round_trips() {
        for interval in [
            Interval::M1,
            Interval::M5,
            Interval::M15,
            Interval::M30,
            Interval::H1,
            Interval::Daily,
            Interval::Weekly,
        ] {
            assert_eq!(Interval::parse(&interval.to_string()), Some(interval));
        }
    }

    #[test]
    fn test_is_intraday() {
        assert!(Interval::M5.is_intraday());
        assert!(Interval::H1.is_intraday());
        assert!(!Interval::Daily.is_intraday());
        assert!(!Interval::Weekly.is_intraday());
    }

    #[test]
    fn test_window_contains_is_half_open() {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let window = BarWindow::ending_at(end, 10);
        assert!(window.contains(window.start));
        assert!(window.contains(end - Duration::seconds(1)));
        assert!(!window.contains(end));
        assert!(!window.contains(window.start - Duration::seconds(1)));
    }

    #[test]
    fn test_normalize_sorts_dedups_and_filters() {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let window = BarWindow::ending_at(end, 5);
        let day = |d| Utc.with_ymd_and_hms(2024, 2, d, 0, 0, 0).unwrap();

        let bars = vec![
            bar_at(day(28), 3.0),
            bar_at(day(26), 1.0),
            bar_at(day(28), 99.0),
            bar_at(day(10), 0.5),
            bar_at(day(27), 2.0),
        ];

        let normalized = normalize_bars(bars, &window);
        let closes: Vec<f64> = normalized.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    }
}
