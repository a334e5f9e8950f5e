//! HTTP routes for the screener service.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ingest::IngestReport;
use crate::screener::{to_text, ScreenReport};
use crate::storage::StoreStats;
use crate::tickers::SourceFailure;
use crate::ScreenerState;

/// Body of `GET /ingest` on success.
pub const INGEST_OK_MESSAGE: &str = "Data fetched and inserted successfully.";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub provider: String,
}

#[derive(Debug, Serialize)]
pub struct ScreenResponse {
    /// Symbols in the deduplicated universe
    pub universe: usize,
    pub failed_sources: Vec<SourceFailure>,
    pub report: ScreenReport,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScreenQuery {
    /// "json" (default) or "text"
    #[serde(default)]
    pub format: Option<String>,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint
pub async fn health(State(state): State<Arc<ScreenerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "stock-screener".to_string(),
        provider: state.provider.name().to_string(),
    })
}

/// Screen the index universe and render the passing symbols as HTML.
pub async fn screen_page(
    State(state): State<Arc<ScreenerState>>,
) -> Result<Html<String>, StatusCode> {
    let (_, report) = state.screen_universe().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to collect ticker universe");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    state.page.render(&report.passed).map(Html).map_err(|e| {
        tracing::error!(error = %e, "Failed to render results page");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Run the ingestion job and confirm with a fixed message.
pub async fn ingest(State(state): State<Arc<ScreenerState>>) -> Result<&'static str, StatusCode> {
    match state.ingest.run().await {
        Ok(_) => Ok(INGEST_OK_MESSAGE),
        Err(e) => {
            tracing::error!(error = %e, "Ingestion failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Screen the index universe and return the full report.
pub async fn api_screen(
    State(state): State<Arc<ScreenerState>>,
    Query(query): Query<ScreenQuery>,
) -> Result<Response, StatusCode> {
    let (tickers, report) = state.screen_universe().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to collect ticker universe");
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    })?;

    match query.format.as_deref() {
        Some("text") => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            to_text(&report),
        )
            .into_response()),
        None | Some("json") => Ok(Json(ScreenResponse {
            universe: tickers.symbols.len(),
            failed_sources: tickers.failed_sources,
            report,
        })
        .into_response()),
        Some(_) => Err(StatusCode::BAD_REQUEST),
    }
}

/// Run the ingestion job and return its report.
pub async fn api_ingest(
    State(state): State<Arc<ScreenerState>>,
) -> Result<Json<IngestReport>, StatusCode> {
    match state.ingest.run().await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            tracing::error!(error = %e, "Ingestion failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Observation store statistics.
pub async fn store_stats(
    State(state): State<Arc<ScreenerState>>,
) -> Result<Json<StoreStats>, StatusCode> {
    match state.store.stats().await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read store stats");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
