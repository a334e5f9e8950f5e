//! Rendering of screen results.
//!
//! - HTML page (the browser view of `GET /`)
//! - Plain text (`GET /api/v1/screen?format=text`)

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;
use std::collections::BTreeSet;

use super::engine::ScreenReport;

const RESULTS_TEMPLATE_NAME: &str = "results";

const RESULTS_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{{title}}</title>
</head>
<body>
    <h1>{{title}}</h1>
    <ul>
    {{#each symbols}}
        <li>{{this}}</li>
    {{/each}}
    </ul>
</body>
</html>
"#;

/// Page heading and title.
pub const RESULTS_TITLE: &str = "Stock Screening Results";

#[derive(Serialize)]
struct ResultsContext<'a> {
    title: &'a str,
    symbols: Vec<&'a str>,
}

/// HTML renderer for the results page.
pub struct ResultsPage {
    registry: Handlebars<'static>,
}

impl ResultsPage {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry
            .register_template_string(RESULTS_TEMPLATE_NAME, RESULTS_TEMPLATE)
            .context("Failed to compile results template")?;
        Ok(Self { registry })
    }

    /// Render passing symbols in ascending order, HTML-escaped.
    pub fn render(&self, symbols: &BTreeSet<String>) -> Result<String> {
        let context = ResultsContext {
            title: RESULTS_TITLE,
            symbols: symbols.iter().map(String::as_str).collect(),
        };
        self.registry
            .render(RESULTS_TEMPLATE_NAME, &context)
            .context("Failed to render results page")
    }
}

/// Plain-text listing, one symbol per line after a summary line.
pub fn to_text(report: &ScreenReport) -> String {
    let mut out = report.summary();
    out.push('\n');
    for symbol in &report.passed {
        out.push_str(symbol);
        out.push('\n');
    }
    if !report.failed.is_empty() {
        out.push_str("\nFailed:\n");
        for failure in &report.failed {
            out.push_str(&format!("{}: {}\n", failure.symbol, failure.error));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screener::engine::SymbolFailure;
    use chrono::Utc;

    #[test]
    fn test_render_lists_symbols_in_order() {
        let page = ResultsPage::new().unwrap();
        let symbols: BTreeSet<String> = ["MSFT", "AAPL", "NVDA"].map(String::from).into();
        let html = page.render(&symbols).unwrap();

        assert!(html.contains("<title>Stock Screening Results</title>"));
        let a = html.find("<li>AAPL</li>").unwrap();
        let m = html.find("<li>MSFT</li>").unwrap();
        let n = html.find("<li>NVDA</li>").unwrap();
        assert!(a < m && m < n);
    }

    #[test]
    fn test_render_empty_list() {
        let page = ResultsPage::new().unwrap();
        let html = page.render(&BTreeSet::new()).unwrap();
        assert!(html.contains("<ul>"));
        assert!(!html.contains("<li>"));
    }

    #[test]
    fn test_render_escapes_symbols() {
        let page = ResultsPage::new().unwrap();
        let symbols: BTreeSet<String> = ["<b>X</b>".to_string()].into();
        let html = page.render(&symbols).unwrap();
        assert!(!html.contains("<b>X</b>"));
        assert!(html.contains("&lt;b&gt;X&lt;/b&gt;"));
    }

    #[test]
    fn test_to_text() {
        let now = Utc::now();
        let report = ScreenReport {
            id: "screen_test".into(),
            passed: ["AAPL".to_string()].into(),
            rejected: 1,
            excluded: BTreeSet::new(),
            failed: vec![SymbolFailure {
                symbol: "ZZZ".into(),
                error: "Network error: reset".into(),
            }],
            total_scanned: 3,
            started_at: now,
            completed_at: now,
            duration_secs: 0.0,
        };
        let text = to_text(&report);
        assert!(text.starts_with("Screened 3 symbols"));
        assert!(text.contains("\nAAPL\n"));
        assert!(text.contains("ZZZ: Network error: reset"));
    }
}
