//! Screening engine.
//!
//! Fetches bars for every symbol in the universe with bounded concurrency,
//! evaluates the EMA stack and collects the symbols that pass. Failures are
//! isolated per symbol: an error or an empty series excludes that symbol and
//! the scan moves on.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use screener_common::Config;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ema::{EmaStack, StackReading};
use crate::data::{BarProvider, BarWindow, Interval};

// ============================================================================
// Screen Result
// ============================================================================

/// Outcome for a single symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    /// Stack criterion met
    Passed(StackReading),
    /// Evaluated, criterion not met
    Rejected(StackReading),
    /// No bars in the window (unknown or delisted symbol)
    Excluded,
    /// Fetch failed
    Failed(String),
}

/// A symbol that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: String,
}

/// Result of a screening run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenReport {
    /// Run ID (timestamp-based)
    pub id: String,
    /// Symbols meeting the criterion
    pub passed: BTreeSet<String>,
    /// Count evaluated but not passing
    pub rejected: usize,
    /// Symbols with no data
    pub excluded: BTreeSet<String>,
    /// Symbols whose fetch failed
    pub failed: Vec<SymbolFailure>,
    /// Total symbols scanned
    pub total_scanned: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl ScreenReport {
    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Screened {} symbols in {:.1}s: {} passed ({:.1}%), {} excluded, {} failed",
            self.total_scanned,
            self.duration_secs,
            self.passed.len(),
            if self.total_scanned > 0 {
                (self.passed.len() as f64 / self.total_scanned as f64) * 100.0
            } else {
                0.0
            },
            self.excluded.len(),
            self.failed.len()
        )
    }
}

// ============================================================================
// Screener Engine
// ============================================================================

/// The screening engine.
pub struct ScreenerEngine {
    provider: Arc<dyn BarProvider>,
    stack: EmaStack,
    interval: Interval,
    lookback_days: u32,
    max_concurrency: usize,
}

impl ScreenerEngine {
    pub fn new(
        provider: Arc<dyn BarProvider>,
        stack: EmaStack,
        interval: Interval,
        lookback_days: u32,
        max_concurrency: usize,
    ) -> Self {
        Self {
            provider,
            stack,
            interval,
            lookback_days,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Create from the `screener` config section.
    pub fn from_config(config: &Config, provider: Arc<dyn BarProvider>) -> anyhow::Result<Self> {
        let section = &config.screener;
        let interval = Interval::parse(&section.interval)
            .ok_or_else(|| anyhow::anyhow!("Unknown screener interval: {}", section.interval))?;
        let stack = EmaStack::new(section.spans.clone())?;

        Ok(Self::new(
            provider,
            stack,
            interval,
            section.lookback_days,
            section.max_concurrency,
        ))
    }

    pub fn stack(&self) -> &EmaStack {
        &self.stack
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Fetch and evaluate one symbol.
    pub async fn screen_symbol(&self, symbol: &str, window: &BarWindow) -> SymbolOutcome {
        let bars = match self.provider.fetch_bars(symbol, self.interval, window).await {
            Ok(bars) => bars,
            Err(e) if e.is_no_data() => {
                debug!(symbol, error = %e, "No data for symbol");
                return SymbolOutcome::Excluded;
            }
            Err(e) => {
                warn!(
                    symbol,
                    provider = self.provider.name(),
                    error = %e,
                    retryable = e.is_recoverable(),
                    "Failed to fetch bars"
                );
                return SymbolOutcome::Failed(e.to_string());
            }
        };

        match self.stack.evaluate_bars(&bars) {
            None => {
                debug!(symbol, "Empty bar series");
                SymbolOutcome::Excluded
            }
            Some(reading) if reading.passed => SymbolOutcome::Passed(reading),
            Some(reading) => SymbolOutcome::Rejected(reading),
        }
    }

    /// Screen every symbol, at most `max_concurrency` in flight.
    pub async fn run<I>(&self, symbols: I) -> ScreenReport
    where
        I: IntoIterator<Item = String>,
    {
        let started_at = Utc::now();
        let id = format!("screen_{}", started_at.format("%Y%m%d_%H%M%S"));
        let window = BarWindow::ending_at(started_at, self.lookback_days);
        let symbols: Vec<String> = symbols.into_iter().collect();

        info!(
            screen_id = %id,
            symbols = symbols.len(),
            interval = %self.interval,
            spans = ?self.stack.spans(),
            "Starting screen"
        );

        let outcomes: Vec<(String, SymbolOutcome)> = stream::iter(symbols)
            .map(|symbol| {
                let window = &window;
                async move {
                    let outcome = self.screen_symbol(&symbol, window).await;
                    (symbol, outcome)
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let total_scanned = outcomes.len();
        let mut passed = BTreeSet::new();
        let mut excluded = BTreeSet::new();
        let mut failed = Vec::new();
        let mut rejected = 0;

        for (symbol, outcome) in outcomes {
            match outcome {
                SymbolOutcome::Passed(_) => {
                    passed.insert(symbol);
                }
                SymbolOutcome::Rejected(_) => rejected += 1,
                SymbolOutcome::Excluded => {
                    excluded.insert(symbol);
                }
                SymbolOutcome::Failed(error) => failed.push(SymbolFailure { symbol, error }),
            }
        }
        failed.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let completed_at = Utc::now();
        let duration_secs = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let report = ScreenReport {
            id,
            passed,
            rejected,
            excluded,
            failed,
            total_scanned,
            started_at,
            completed_at,
            duration_secs,
        };

        info!(
            screen_id = %report.id,
            passed = report.passed.len(),
            failed = report.failed.len(),
            duration = format!("{:.1}s", duration_secs),
            "{}",
            report.summary()
        );

        report
    }
}
