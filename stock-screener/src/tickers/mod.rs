//! Ticker universe sources.
//!
//! - Index constituent lists scraped from public HTML pages (S&P 500, Dow
//!   Jones Industrial Average, NASDAQ-100 by default)
//! - A plain-text symbols file, one ticker per line, for ingestion
//!
//! Each index list is fetched independently; one failing page does not stop
//! the others from contributing.

pub mod html_table;

pub use html_table::{extract_tables, HtmlTable};

use futures::future::join_all;
use screener_common::{Config, Error, IndexSourceConfig, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = "stock-screener/0.1 (index constituents)";

/// An index list that could not be fetched or parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Deduplicated ticker universe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickerReport {
    /// Union of all lists, sorted
    pub symbols: BTreeSet<String>,
    /// Symbols contributed per source, before deduplication
    pub per_source: Vec<(String, usize)>,
    pub failed_sources: Vec<SourceFailure>,
}

/// Fetches index constituent lists.
pub struct TickerSource {
    client: reqwest::Client,
    sources: Vec<IndexSourceConfig>,
}

impl TickerSource {
    pub fn new(sources: Vec<IndexSourceConfig>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, sources }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.screener.index_sources.clone(),
            Duration::from_secs(config.data.timeout_secs),
        )
    }

    pub fn sources(&self) -> &[IndexSourceConfig] {
        &self.sources
    }

    /// Fetch one list: the `column` of the `table_index`-th table on the page.
    pub async fn fetch_list(&self, source: &IndexSourceConfig) -> Result<Vec<String>> {
        debug!(source = %source.name, url = %source.url, "Fetching index list");

        let response = self
            .client
            .get(&source.url)
            .send()
            .await
            .map_err(|e| request_error(&source.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::External(format!("{}: HTTP {}", source.url, status)));
        }

        let html = response
            .text()
            .await
            .map_err(|e| request_error(&source.url, e))?;

        parse_index_page(&html, source)
    }

    /// Fetch all lists concurrently and merge them.
    ///
    /// Fails only when every list fails.
    pub async fn collect(&self) -> Result<TickerReport> {
        let results = join_all(self.sources.iter().map(|s| self.fetch_list(s))).await;

        let mut report = TickerReport::default();
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(symbols) => {
                    report.per_source.push((source.name.clone(), symbols.len()));
                    report.symbols.extend(symbols);
                }
                Err(e) => {
                    warn!(source = %source.name, error = %e, "Failed to fetch index list");
                    report.failed_sources.push(SourceFailure {
                        source: source.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if !self.sources.is_empty() && report.failed_sources.len() == self.sources.len() {
            return Err(Error::External("all index sources failed".into()));
        }

        info!(
            symbols = report.symbols.len(),
            sources = report.per_source.len(),
            failed = report.failed_sources.len(),
            "Collected ticker universe"
        );
        Ok(report)
    }
}

fn request_error(url: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::External(format!("{}: {}", url, e))
    }
}

/// Extract a source's symbol column from page HTML.
pub fn parse_index_page(html: &str, source: &IndexSourceConfig) -> Result<Vec<String>> {
    let tables = extract_tables(html)?;
    let table = tables.get(source.table_index).ok_or_else(|| {
        Error::NotFound(format!(
            "{}: table {} (page has {})",
            source.name,
            source.table_index,
            tables.len()
        ))
    })?;

    let symbols = table.column(&source.column).ok_or_else(|| {
        Error::NotFound(format!(
            "{}: column {:?} not in {:?}",
            source.name, source.column, table.headers
        ))
    })?;

    Ok(symbols.into_iter().map(|s| s.trim().to_string()).collect())
}

/// Parse symbols file content: trimmed lines, blanks skipped, first
/// occurrence order kept.
pub fn parse_symbol_lines(content: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.to_string()))
        .map(String::from)
        .collect()
}

/// Read a symbols file.
pub async fn read_symbols_file(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .context(format!("reading symbols file {}", path.display()))?;
    Ok(parse_symbol_lines(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(table_index: usize, column: &str) -> IndexSourceConfig {
        IndexSourceConfig {
            name: "test".into(),
            url: "http://localhost/unused".into(),
            table_index,
            column: column.into(),
        }
    }

    const PAGE: &str = r#"
        <table><tr><th>Symbol</th></tr><tr><td>NOPE</td></tr></table>
        <table>
          <tr><th>Company</th><th>Ticker</th></tr>
          <tr><td>Apple</td><td>AAPL</td></tr>
          <tr><td>Microsoft</td><td> MSFT </td></tr>
        </table>
    "#;

    #[test]
    fn test_parse_index_page_by_position() {
        let symbols = parse_index_page(PAGE, &source(1, "Ticker")).unwrap();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_parse_index_page_missing_table() {
        let err = parse_index_page(PAGE, &source(3, "Ticker")).unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_parse_index_page_missing_column() {
        let err = parse_index_page(PAGE, &source(0, "Ticker")).unwrap_err();
        assert!(err.to_string().contains("Ticker"));
    }

    #[test]
    fn test_parse_symbol_lines() {
        let symbols = parse_symbol_lines("AAPL\n\n  MSFT \nAAPL\r\nGOOG\n");
        assert_eq!(symbols, vec!["AAPL", "MSFT", "GOOG"]);
    }

    #[tokio::test]
    async fn test_read_symbols_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sp500_symbols.txt");
        std::fs::write(&path, "AAA\nBBB\n").unwrap();
        assert_eq!(read_symbols_file(&path).await.unwrap(), vec!["AAA", "BBB"]);

        let err = read_symbols_file(&dir.path().join("missing.txt")).await.unwrap_err();
        assert!(err.to_string().starts_with("reading symbols file"));
    }

    #[test]
    fn test_parse_index_page_counts_nested_tables() {
        let page = r#"
            <table><tr><td><table><tr><td>logo</td></tr></table></td></tr></table>
            <table><tr><th>Symbol</th></tr><tr><td>KO</td></tr></table>
        "#;
        assert_eq!(parse_index_page(page, &source(2, "Symbol")).unwrap(), vec!["KO"]);
        assert!(parse_index_page(page, &source(1, "Symbol")).is_err());
    }

    #[tokio::test]
    async fn test_slow_page_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let mut slow = source(0, "Symbol");
        slow.url = format!("{}/slow", server.uri());
        let tickers = TickerSource::new(vec![slow.clone()], Duration::from_millis(200));

        let err = tickers.fetch_list(&slow).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(err.status_code(), 504);
    }

    #[tokio::test]
    async fn test_collect_fails_when_every_source_fails() {
        let mut unreachable = source(0, "Symbol");
        unreachable.url = "http://127.0.0.1:9/list".into();
        let tickers = TickerSource::new(vec![unreachable], Duration::from_secs(2));
        assert!(tickers.collect().await.is_err());
    }
}
