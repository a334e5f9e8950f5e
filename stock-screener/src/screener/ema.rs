//! Exponential moving averages and the bullish EMA stack test.
//!
//! EMAs follow the recursive, non-bias-corrected form:
//!
//! ```text
//! bar 0  → ema = close
//! bar n  → ema = α·close + (1−α)·ema_prev      α = 2/(span+1)
//! ```
//!
//! The stack passes when the EMAs are strictly decreasing from the shortest
//! span to the longest and the latest close sits at or above the shortest.

use serde::{Deserialize, Serialize};
use screener_common::Error;

use crate::data::Bar;

/// Default stack spans, shortest first.
pub const DEFAULT_SPANS: [u32; 5] = [20, 25, 30, 35, 40];

/// Incremental EMA.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    span: u32,
    value: f64,
    count: usize,
}

impl Ema {
    pub fn new(span: u32) -> Self {
        Self {
            alpha: 2.0 / (f64::from(span) + 1.0),
            span,
            value: 0.0,
            count: 0,
        }
    }

    /// Feed one close, return the current EMA value.
    pub fn update(&mut self, price: f64) -> f64 {
        if self.count == 0 {
            self.value = price;
        } else {
            self.value = self.alpha * price + (1.0 - self.alpha) * self.value;
        }
        self.count += 1;
        self.value
    }

    /// Current value, `None` before the first observation.
    pub fn value(&self) -> Option<f64> {
        (self.count > 0).then_some(self.value)
    }

    /// True once at least `span` observations have been fed.
    pub fn is_warm(&self) -> bool {
        self.count >= self.span as usize
    }

    pub fn span(&self) -> u32 {
        self.span
    }
}

/// EMA at every position of `closes`.
pub fn ema_series(closes: &[f64], span: u32) -> Vec<f64> {
    let mut ema = Ema::new(span);
    closes.iter().map(|&c| ema.update(c)).collect()
}

/// EMA at the last position of `closes`.
pub fn ema_last(closes: &[f64], span: u32) -> Option<f64> {
    let mut ema = Ema::new(span);
    closes.iter().for_each(|&c| {
        ema.update(c);
    });
    ema.value()
}

/// EMA value for one span at the latest bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmaValue {
    pub span: u32,
    pub value: f64,
}

/// Outcome of evaluating the stack on one close series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackReading {
    /// Latest close
    pub close: f64,
    /// EMA per span at the latest bar, shortest span first
    pub values: Vec<EmaValue>,
    /// Number of closes evaluated
    pub bars: usize,
    pub passed: bool,
}

impl StackReading {
    /// Whether the series is at least as long as the longest span.
    /// Shorter series are still evaluated; this is informational.
    pub fn is_warm(&self) -> bool {
        self.values
            .last()
            .map(|v| self.bars >= v.span as usize)
            .unwrap_or(false)
    }
}

/// Bullish EMA stack criterion over an ordered set of spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmaStack {
    spans: Vec<u32>,
}

impl Default for EmaStack {
    fn default() -> Self {
        Self {
            spans: DEFAULT_SPANS.to_vec(),
        }
    }
}

impl EmaStack {
    /// Spans must be non-empty, positive and strictly increasing.
    pub fn new(spans: Vec<u32>) -> Result<Self, Error> {
        if spans.is_empty() {
            return Err(Error::InvalidInput("at least one EMA span is required".into()));
        }
        if spans.contains(&0) {
            return Err(Error::InvalidInput("EMA spans must be positive".into()));
        }
        if spans.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidInput(format!(
                "EMA spans must be strictly increasing: {:?}",
                spans
            )));
        }
        Ok(Self { spans })
    }

    pub fn spans(&self) -> &[u32] {
        &self.spans
    }

    /// Evaluate the stack on closes ordered oldest first. `None` when empty.
    pub fn evaluate(&self, closes: &[f64]) -> Option<StackReading> {
        let close = *closes.last()?;
        let values: Vec<EmaValue> = self
            .spans
            .iter()
            .filter_map(|&span| ema_last(closes, span).map(|value| EmaValue { span, value }))
            .collect();

        let passed = is_bullish_stack(close, &values);
        Some(StackReading {
            close,
            values,
            bars: closes.len(),
            passed,
        })
    }

    pub fn evaluate_bars(&self, bars: &[Bar]) -> Option<StackReading> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        self.evaluate(&closes)
    }
}

/// Strict ordering; any tie or NaN fails.
fn is_bullish_stack(close: f64, values: &[EmaValue]) -> bool {
    let Some(shortest) = values.first() else {
        return false;
    };
    let ordered = values.windows(2).all(|w| w[0].value > w[1].value);
    ordered && close >= shortest.value
}
