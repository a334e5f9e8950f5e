//! Stock Screener - EMA stack screening and OHLCV ingestion service.
//!
//! Serves the screening results page and the ingestion trigger over HTTP.

use anyhow::Result;
use screener_common::logging::init_logging_with_exclusions;
use screener_common::Config;
use stock_screener::ScreenerService;

#[tokio::main]
async fn main() -> Result<()> {
    // Start timing immediately for cold-start measurement
    let startup_start = std::time::Instant::now();

    // Load configuration (file, then environment overrides)
    let config = Config::load_and_validate()?;

    // Initialize logging
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Stock Screener v{}", env!("CARGO_PKG_VERSION"));

    let service = ScreenerService::new(config)?;

    // Log startup timing before entering main service loop
    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
