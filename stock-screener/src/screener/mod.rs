//! EMA stack screener.
//!
//! Scans an index universe and keeps the symbols whose latest close sits on
//! top of a bullish stack of exponential moving averages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ TickerSource │────▶│ ScreenerEngine│────▶│ ResultsPage  │
//! │ (index lists)│     │ fetch + EMA  │     │ HTML / JSON  │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │
//!                      ┌──────┴───────┐
//!                      │ BarProvider  │
//!                      └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use stock_screener::screener::{EmaStack, ScreenerEngine};
//!
//! let engine = ScreenerEngine::new(provider, EmaStack::default(), Interval::Daily, 183, 8);
//! let report = engine.run(symbols).await;
//! ```

pub mod ema;
pub mod engine;
pub mod report;

pub use ema::{ema_last, ema_series, Ema, EmaStack, EmaValue, StackReading, DEFAULT_SPANS};
pub use engine::{ScreenReport, ScreenerEngine, SymbolFailure, SymbolOutcome};
pub use report::{to_text, ResultsPage, RESULTS_TITLE};
