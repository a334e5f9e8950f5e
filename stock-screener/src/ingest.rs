//! OHLCV ingestion job.
//!
//! Reads the symbols file, fetches bars for every symbol with bounded
//! concurrency and appends them to the observation store as results arrive.
//! A fetch failure skips that symbol; a storage failure aborts the job.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use screener_common::Config;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::data::{BarProvider, BarWindow, Interval};
use crate::screener::SymbolFailure;
use crate::storage::{ObservationStore, StoredObservation};
use crate::tickers::read_symbols_file;

/// Result of one ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Symbols read from the file
    pub symbols: usize,
    /// Rows appended
    pub stored: usize,
    /// Bars already present for the same (symbol, timestamp)
    pub duplicates: usize,
    /// Symbols with no bars in the window
    pub empty: Vec<String>,
    pub failed: Vec<SymbolFailure>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl IngestReport {
    pub fn summary(&self) -> String {
        format!(
            "Ingested {} symbols in {:.1}s: {} rows stored, {} duplicates, {} empty, {} failed",
            self.symbols,
            self.duration_secs,
            self.stored,
            self.duplicates,
            self.empty.len(),
            self.failed.len()
        )
    }
}

/// Fetch-and-store batch job.
pub struct IngestJob {
    provider: Arc<dyn BarProvider>,
    store: Arc<ObservationStore>,
    symbols_file: PathBuf,
    interval: Interval,
    lookback_days: u32,
    max_concurrency: usize,
}

impl IngestJob {
    pub fn new(
        provider: Arc<dyn BarProvider>,
        store: Arc<ObservationStore>,
        symbols_file: impl Into<PathBuf>,
        interval: Interval,
        lookback_days: u32,
        max_concurrency: usize,
    ) -> Self {
        Self {
            provider,
            store,
            symbols_file: symbols_file.into(),
            interval,
            lookback_days,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Create from the `ingest` config section.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn BarProvider>,
        store: Arc<ObservationStore>,
    ) -> Result<Self> {
        let section = &config.ingest;
        let interval = Interval::parse(&section.interval)
            .ok_or_else(|| anyhow::anyhow!("Unknown ingest interval: {}", section.interval))?;

        Ok(Self::new(
            provider,
            store,
            section.symbols_file.clone(),
            interval,
            section.lookback_days,
            section.max_concurrency,
        ))
    }

    pub fn store(&self) -> &Arc<ObservationStore> {
        &self.store
    }

    /// Run against the configured symbols file.
    pub async fn run(&self) -> Result<IngestReport> {
        let symbols = read_symbols_file(&self.symbols_file).await?;
        self.ingest_symbols(symbols).await
    }

    /// Fetch and store bars for `symbols`.
    pub async fn ingest_symbols(&self, symbols: Vec<String>) -> Result<IngestReport> {
        let started_at = Utc::now();
        let window = BarWindow::ending_at(started_at, self.lookback_days);

        info!(
            symbols = symbols.len(),
            interval = %self.interval,
            provider = self.provider.name(),
            "Starting ingestion"
        );

        let mut report = IngestReport {
            symbols: symbols.len(),
            stored: 0,
            duplicates: 0,
            empty: Vec::new(),
            failed: Vec::new(),
            started_at,
            duration_secs: 0.0,
        };

        let mut fetches = stream::iter(symbols)
            .map(|symbol| {
                let window = &window;
                async move {
                    let result = self.provider.fetch_bars(&symbol, self.interval, window).await;
                    (symbol, result)
                }
            })
            .buffer_unordered(self.max_concurrency);

        while let Some((symbol, result)) = fetches.next().await {
            let bars = match result {
                Ok(bars) => bars,
                Err(e) if e.is_no_data() => {
                    debug!(symbol = %symbol, error = %e, "No data for symbol");
                    report.empty.push(symbol);
                    continue;
                }
                Err(e) => {
                    warn!(
                        symbol = %symbol,
                        error = %e,
                        retryable = e.is_recoverable(),
                        "Failed to fetch bars"
                    );
                    report.failed.push(SymbolFailure {
                        symbol,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if bars.is_empty() {
                debug!(symbol = %symbol, "Empty bar series");
                report.empty.push(symbol);
                continue;
            }

            let observations: Vec<StoredObservation> =
                bars.iter().map(StoredObservation::from_bar).collect();
            let summary = self
                .store
                .append_batch(&observations)
                .await
                .with_context(|| format!("Failed to store observations for {}", symbol))?;

            report.stored += summary.inserted;
            report.duplicates += summary.duplicates;
            info!(
                symbol = %symbol,
                inserted = summary.inserted,
                duplicates = summary.duplicates,
                "Data inserted for {}",
                symbol
            );
        }

        report.empty.sort();
        report.failed.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        report.duration_secs = (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0;

        info!("{}", report.summary());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Bar, ProviderError};
    use async_trait::async_trait;
    use chrono::Duration;
    use tempfile::TempDir;

    struct FixedProvider;

    #[async_trait]
    impl BarProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch_bars(
            &self,
            symbol: &str,
            interval: Interval,
            window: &BarWindow,
        ) -> Result<Vec<Bar>, ProviderError> {
            let count = match symbol {
                "AAA" => 3,
                "BBB" => 2,
                "NONE" => 0,
                "GONE" => return Err(ProviderError::DataNotAvailable(symbol.into())),
                _ => return Err(ProviderError::Network("timeout".into())),
            };
            let end = window.end - Duration::hours(1);
            Ok((0..count)
                .map(|i| Bar {
                    symbol: symbol.to_string(),
                    interval,
                    timestamp: end - Duration::minutes(5 * (count - i)),
                    timezone: Some("US/Eastern".into()),
                    open: 1.0,
                    high: 1.0,
                    low: 1.0,
                    close: 1.0,
                    volume: 10.0,
                })
                .collect())
        }
    }

    fn job(store: Arc<ObservationStore>, file: PathBuf) -> IngestJob {
        IngestJob::new(Arc::new(FixedProvider), store, file, Interval::M5, 5, 2)
    }

    #[tokio::test]
    async fn test_ingest_symbols() {
        let store = Arc::new(ObservationStore::in_memory(true).unwrap());
        let job = job(store.clone(), PathBuf::from("unused.txt"));

        let symbols = ["AAA", "BBB", "NONE", "GONE", "ERR"].map(String::from).to_vec();
        let report = job.ingest_symbols(symbols).await.unwrap();

        assert_eq!(report.symbols, 5);
        assert_eq!(report.stored, 5);
        assert_eq!(report.duplicates, 0);
        assert_eq!(report.empty, vec!["GONE", "NONE"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].symbol, "ERR");
        assert_eq!(store.count_for_symbol("AAA").await.unwrap(), 3);
        assert_eq!(store.count_for_symbol("BBB").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_run_reads_symbols_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("sp500_symbols.txt");
        std::fs::write(&file, "AAA\n\n BBB \n").unwrap();

        let store = Arc::new(ObservationStore::in_memory(true).unwrap());
        let report = job(store.clone(), file).run().await.unwrap();
        assert_eq!(report.symbols, 2);
        assert_eq!(store.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_missing_symbols_file_is_error() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ObservationStore::in_memory(true).unwrap());
        let result = job(store, dir.path().join("missing.txt")).run().await;
        assert!(result.is_err());
    }
}
