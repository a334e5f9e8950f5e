//! Stock Screener Library
//!
//! Screens index constituents for a bullish EMA stack and ingests OHLCV bars
//! into a local SQLite store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     stock-screener (Rust Service)                   │
//! │                              :4480                                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐      │
//! │  │  Tickers        │  │  Screener       │  │  Ingest         │      │
//! │  │  (index pages)  │─▶│  (EMA stack)    │  │  (bars → store) │      │
//! │  └─────────────────┘  └────────┬────────┘  └────────┬────────┘      │
//! │                                └──────┬─────────────┘               │
//! │                              ┌────────▼────────┐                    │
//! │                              │  Bar Provider   │                    │
//! │                              │ (Yahoo/AV/file) │                    │
//! │                              └─────────────────┘                    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Routes
//!
//! - `GET /` screens the universe and renders the passing symbols as HTML
//! - `GET /ingest` fetches bars for the symbols file and stores them
//! - `GET /health`
//! - `GET /api/v1/screen`, `POST /api/v1/ingest`, `GET /api/v1/observations/stats`

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod ingest;
pub mod routes;
pub mod screener;
pub mod storage;
pub mod tickers;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use screener_common::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::data::{build_provider, BarProvider};
use crate::ingest::IngestJob;
use crate::screener::{ResultsPage, ScreenReport, ScreenerEngine};
use crate::storage::ObservationStore;
use crate::tickers::{TickerReport, TickerSource};

/// Screener service state
pub struct ScreenerState {
    /// Configuration
    pub config: Config,
    /// Bar source shared by screening and ingestion
    pub provider: Arc<dyn BarProvider>,
    /// Index constituent lists
    pub tickers: Arc<TickerSource>,
    pub engine: Arc<ScreenerEngine>,
    pub ingest: Arc<IngestJob>,
    pub store: Arc<ObservationStore>,
    /// HTML results template
    pub page: Arc<ResultsPage>,
}

impl ScreenerState {
    /// Build state from configuration, opening the provider and store it names.
    pub fn new(config: Config) -> Result<Self> {
        let provider = build_provider(&config)?;
        let store = Arc::new(ObservationStore::new((&config.storage).into())?);
        Self::with_parts(config, provider, store)
    }

    /// Build state around an existing provider and store.
    pub fn with_parts(
        config: Config,
        provider: Arc<dyn BarProvider>,
        store: Arc<ObservationStore>,
    ) -> Result<Self> {
        let tickers = Arc::new(TickerSource::from_config(&config));
        let engine = Arc::new(ScreenerEngine::from_config(&config, provider.clone())?);
        let ingest = Arc::new(IngestJob::from_config(&config, provider.clone(), store.clone())?);
        let page = Arc::new(ResultsPage::new()?);

        Ok(Self {
            config,
            provider,
            tickers,
            engine,
            ingest,
            store,
            page,
        })
    }

    /// Collect the ticker universe and screen it.
    pub async fn screen_universe(&self) -> screener_common::Result<(TickerReport, ScreenReport)> {
        let tickers = self.tickers.collect().await?;
        let report = self.engine.run(tickers.symbols.iter().cloned()).await;
        Ok((tickers, report))
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<ScreenerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::screen_page))
        .route("/ingest", get(routes::ingest))
        .route("/health", get(routes::health))
        .route("/api/v1/screen", get(routes::api_screen))
        .route("/api/v1/ingest", post(routes::api_ingest))
        .route("/api/v1/observations/stats", get(routes::store_stats))
        .with_state(state)
        .layer(cors)
}

/// Screener service
pub struct ScreenerService {
    state: Arc<ScreenerState>,
}

impl ScreenerService {
    /// Create a new screener service
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self::from_state(ScreenerState::new(config)?))
    }

    pub fn from_state(state: ScreenerState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> &Arc<ScreenerState> {
        &self.state
    }

    /// Build the router for this service.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Start the HTTP server
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self.state.config.bind_address().parse()?;

        tracing::info!(
            address = %addr,
            provider = self.state.provider.name(),
            "Starting stock screener"
        );

        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
