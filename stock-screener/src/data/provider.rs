//! Bar provider abstraction.
//!
//! Defines the `BarProvider` trait that every market data source implements,
//! so the screener and the ingestion job never depend on a concrete vendor.

use async_trait::async_trait;
use screener_common::Config;
use std::sync::Arc;
use thiserror::Error;

use super::{AlphaVantageProvider, Bar, BarWindow, Interval, LocalFileProvider, YahooChartProvider};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),
    /// Authentication error (missing or rejected API key)
    #[error("Authentication error: {0}")]
    Auth(String),
    /// Rate limit exceeded
    #[error("Rate limited{}", retry_suffix(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },
    /// No data for the requested symbol (unknown or delisted)
    #[error("Data not available: {0}")]
    DataNotAvailable(String),
    /// Provider is temporarily unavailable
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Response body could not be understood
    #[error("Parse error: {0}")]
    Parse(String),
    /// Internal provider error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn retry_suffix(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs
        .map(|secs| format!(", retry after {} seconds", secs))
        .unwrap_or_default()
}

impl ProviderError {
    /// Check if the error is recoverable (worth retrying later)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_)
        )
    }

    /// Whether the provider reported that the symbol simply has no data.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::DataNotAvailable(_))
    }

    /// Map a transport failure from reqwest.
    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Network("Request timeout".into())
        } else if e.is_connect() {
            Self::Network("Connection failed".into())
        } else {
            Self::Network(e.to_string())
        }
    }
}

// ============================================================================
// Bar Provider Trait
// ============================================================================

/// Trait for OHLCV bar sources.
///
/// Implementations return bars sorted ascending by timestamp, with no
/// duplicate timestamps and nothing outside the requested window. A symbol
/// with no data in the window yields `Ok(vec![])`.
#[async_trait]
pub trait BarProvider: Send + Sync {
    /// Provider name (e.g., "yahoo", "alphavantage")
    fn name(&self) -> &'static str;

    /// Fetch bars for `symbol` at `interval` within `window`.
    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
        window: &BarWindow,
    ) -> Result<Vec<Bar>, ProviderError>;
}

/// Build the provider selected by `data.provider`.
pub fn build_provider(config: &Config) -> anyhow::Result<Arc<dyn BarProvider>> {
    let data = &config.data;
    let provider: Arc<dyn BarProvider> = match data.provider.as_str() {
        "yahoo" => Arc::new(YahooChartProvider::from_config(data)),
        "alphavantage" => {
            let api_key = config.alpha_vantage_api_key().ok_or_else(|| {
                anyhow::anyhow!("data.provider is alphavantage but no API key is configured")
            })?;
            Arc::new(AlphaVantageProvider::from_config(data, api_key))
        }
        "local" => Arc::new(LocalFileProvider::new(&data.local_data_dir)),
        other => anyhow::bail!("Unknown data provider: {}", other),
    };

    tracing::info!(provider = provider.name(), "Bar provider selected");
    Ok(provider)
}
