//! End-to-end tests for the screening path.
//!
//! Index pages and the Yahoo chart API are served by wiremock; the flow runs
//! from ticker collection through EMA evaluation to the rendered page.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use screener_common::{Config, IndexSourceConfig};
use stock_screener::data::{BarProvider, Interval, YahooChartProvider};
use stock_screener::screener::{EmaStack, ScreenerEngine};
use stock_screener::tickers::TickerSource;
use stock_screener::{build_router, ScreenerState};

// ============================================================================
// Fixtures
// ============================================================================

/// Daily chart body, one bar per close ending yesterday.
fn chart_body(closes: &[f64]) -> serde_json::Value {
    let today = Utc::now().date_naive().and_hms_opt(14, 30, 0).unwrap().and_utc();
    let n = closes.len() as i64;
    let timestamps: Vec<i64> = (0..n)
        .map(|i| (today - Duration::days(n - i)).timestamp())
        .collect();

    json!({
        "chart": {
            "result": [{
                "meta": { "symbol": "X", "exchangeTimezoneName": "America/New_York" },
                "timestamp": timestamps,
                "indicators": { "quote": [{
                    "open": closes,
                    "high": closes,
                    "low": closes,
                    "close": closes,
                    "volume": vec![1000; closes.len()]
                }]}
            }],
            "error": null
        }
    })
}

fn rising() -> Vec<f64> {
    (1..=80).map(f64::from).collect()
}

fn flat() -> Vec<f64> {
    vec![50.0; 80]
}

fn falling() -> Vec<f64> {
    (1..=80).rev().map(f64::from).collect()
}

async fn mount_chart(server: &MockServer, symbol: &str, closes: &[f64]) {
    Mock::given(method("GET"))
        .and(path(format!("/v8/finance/chart/{}", symbol)))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart_body(closes)))
        .mount(server)
        .await;
}

async fn mount_unknown(server: &MockServer, symbol: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v8/finance/chart/{}", symbol)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "chart": {
                "result": null,
                "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" }
            }
        })))
        .mount(server)
        .await;
}

fn table_page(header: &str, symbols: &[&str]) -> String {
    let rows: String = symbols
        .iter()
        .map(|s| format!("<tr><td>{}</td><td>Company</td></tr>", s))
        .collect();
    format!(
        "<html><body><table><tr><th>{}</th><th>Security</th></tr>{}</table></body></html>",
        header, rows
    )
}

async fn mount_page(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

fn source(server: &MockServer, name: &str, route: &str, column: &str) -> IndexSourceConfig {
    IndexSourceConfig {
        name: name.into(),
        url: format!("{}{}", server.uri(), route),
        table_index: 0,
        column: column.into(),
    }
}

fn yahoo(server: &MockServer) -> Arc<dyn BarProvider> {
    Arc::new(YahooChartProvider::new(
        server.uri(),
        std::time::Duration::from_secs(5),
        6000,
    ))
}

// ============================================================================
// Engine
// ============================================================================

#[tokio::test]
async fn test_only_rising_series_passes() {
    let server = MockServer::start().await;
    mount_chart(&server, "RISE", &rising()).await;
    mount_chart(&server, "FLAT", &flat()).await;
    mount_chart(&server, "FALL", &falling()).await;
    mount_unknown(&server, "GONE").await;

    let engine = ScreenerEngine::new(yahoo(&server), EmaStack::default(), Interval::Daily, 120, 4);
    let report = engine
        .run(["RISE", "FLAT", "FALL", "GONE"].map(String::from))
        .await;

    assert_eq!(report.passed.iter().collect::<Vec<_>>(), vec!["RISE"]);
    assert_eq!(report.rejected, 2);
    assert!(report.excluded.contains("GONE"));
    assert!(report.failed.is_empty());
    assert_eq!(report.total_scanned, 4);
}

#[tokio::test]
async fn test_server_error_is_isolated_to_symbol() {
    let server = MockServer::start().await;
    mount_chart(&server, "RISE", &rising()).await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/BOOM"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let engine = ScreenerEngine::new(yahoo(&server), EmaStack::default(), Interval::Daily, 120, 2);
    let report = engine.run(["BOOM", "RISE"].map(String::from)).await;

    assert!(report.passed.contains("RISE"));
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].symbol, "BOOM");
}

// ============================================================================
// Ticker Sources
// ============================================================================

#[tokio::test]
async fn test_duplicate_symbols_across_lists_appear_once() {
    let server = MockServer::start().await;
    mount_page(&server, "/sp500", table_page("Symbol", &["AAPL", "MSFT", "JPM"])).await;
    mount_page(&server, "/dow", table_page("Symbol", &["JPM", "AAPL", "KO"])).await;
    mount_page(&server, "/ndx", table_page("Ticker", &["MSFT", "AAPL", "NVDA"])).await;

    let tickers = TickerSource::new(
        vec![
            source(&server, "sp500", "/sp500", "Symbol"),
            source(&server, "dow", "/dow", "Symbol"),
            source(&server, "ndx", "/ndx", "Ticker"),
        ],
        std::time::Duration::from_secs(5),
    );
    let report = tickers.collect().await.unwrap();

    assert_eq!(
        report.symbols.iter().collect::<Vec<_>>(),
        vec!["AAPL", "JPM", "KO", "MSFT", "NVDA"]
    );
    assert_eq!(report.per_source.len(), 3);
    assert!(report.failed_sources.is_empty());
}

#[tokio::test]
async fn test_failing_list_is_tolerated() {
    let server = MockServer::start().await;
    mount_page(&server, "/sp500", table_page("Symbol", &["AAPL", "MSFT"])).await;
    Mock::given(method("GET"))
        .and(path("/dow"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let tickers = TickerSource::new(
        vec![
            source(&server, "sp500", "/sp500", "Symbol"),
            source(&server, "dow", "/dow", "Symbol"),
        ],
        std::time::Duration::from_secs(5),
    );
    let report = tickers.collect().await.unwrap();

    assert_eq!(report.symbols.len(), 2);
    assert_eq!(report.failed_sources.len(), 1);
    assert_eq!(report.failed_sources[0].source, "dow");
}

// ============================================================================
// HTTP
// ============================================================================

fn service_config(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.data.provider = "yahoo".into();
    config.data.yahoo_base_url = server.uri();
    config.data.rate_limit_rpm = 6000;
    config.data.timeout_secs = 5;
    config.screener.interval = "1d".into();
    config.screener.lookback_days = 120;
    config.screener.index_sources = vec![
        source(server, "sp500", "/sp500", "Symbol"),
        source(server, "ndx", "/ndx", "Ticker"),
    ];
    config.storage.db_path = dir.path().join("observations.db");
    config.ingest.symbols_file = dir.path().join("sp500_symbols.txt");
    config
}

#[tokio::test]
async fn test_index_page_lists_passing_symbols() {
    let server = MockServer::start().await;
    mount_page(&server, "/sp500", table_page("Symbol", &["RISE", "FALL"])).await;
    mount_page(&server, "/ndx", table_page("Ticker", &["RISE", "FLAT"])).await;
    mount_chart(&server, "RISE", &rising()).await;
    mount_chart(&server, "FLAT", &flat()).await;
    mount_chart(&server, "FALL", &falling()).await;

    let dir = TempDir::new().unwrap();
    let state = ScreenerState::new(service_config(&server, &dir)).unwrap();
    let app = build_router(Arc::new(state));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(html.contains("<title>Stock Screening Results</title>"));
    assert_eq!(html.matches("<li>RISE</li>").count(), 1);
    assert!(!html.contains("FLAT"));
    assert!(!html.contains("FALL"));
}

#[tokio::test]
async fn test_screen_api_reports_failed_sources() {
    let server = MockServer::start().await;
    mount_page(&server, "/sp500", table_page("Symbol", &["RISE"])).await;
    mount_chart(&server, "RISE", &rising()).await;

    let dir = TempDir::new().unwrap();
    let state = ScreenerState::new(service_config(&server, &dir)).unwrap();
    let app = build_router(Arc::new(state));

    let response = app
        .oneshot(Request::builder().uri("/api/v1/screen").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(json["universe"], 1);
    assert_eq!(json["report"]["passed"], json!(["RISE"]));
    assert_eq!(json["failed_sources"][0]["source"], "ndx");
}

#[tokio::test]
async fn test_index_page_errors_when_every_list_fails() {
    let server = MockServer::start().await;

    let dir = TempDir::new().unwrap();
    let state = ScreenerState::new(service_config(&server, &dir)).unwrap();
    let app = build_router(Arc::new(state));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
