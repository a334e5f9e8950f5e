//! Local feed provider.
//!
//! Reads `<dir>/<SYMBOL>.json` files in the Alpha Vantage time-series shape,
//! for offline runs and fixtures. A symbol without a file has no data.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::alphavantage::parse_time_series;
use super::provider::{BarProvider, ProviderError};
use super::{normalize_bars, Bar, BarWindow, Interval};

pub struct LocalFileProvider {
    dir: PathBuf,
}

impl LocalFileProvider {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// File backing `symbol`.
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.json", symbol.trim()))
    }
}

#[async_trait]
impl BarProvider for LocalFileProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
        window: &BarWindow,
    ) -> Result<Vec<Bar>, ProviderError> {
        let path = self.path_for(symbol);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(symbol = symbol, path = %path.display(), "No local feed file");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(ProviderError::Internal(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let body: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| ProviderError::Parse(format!("{}: {}", path.display(), e)))?;

        let bars = parse_time_series(symbol, interval, &body)?;
        Ok(normalize_bars(bars, window))
    }
}
