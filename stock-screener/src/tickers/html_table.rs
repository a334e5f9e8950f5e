//! HTML table extraction.
//!
//! Parses the page into a DOM and returns every `<table>` in document order,
//! nested tables included, so table positions match what a browser counts.
//! Rows and cells belong to their nearest enclosing table; `colspan` and
//! `rowspan` are not interpreted.

use scraper::{ElementRef, Html, Selector};
use screener_common::{Error, Result};

/// One parsed table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlTable {
    /// Text of the first all-`<th>` row
    pub headers: Vec<String>,
    /// Remaining rows, cell text in document order
    pub rows: Vec<Vec<String>>,
}

impl HtmlTable {
    /// Position of the header named `name` (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name.trim()))
    }

    /// Non-empty values of the named column.
    pub fn column(&self, name: &str) -> Option<Vec<String>> {
        let index = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .filter_map(|row| row.get(index))
                .filter(|v| !v.is_empty())
                .cloned()
                .collect(),
        )
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| Error::Internal(format!("Invalid CSS selector {:?}: {:?}", css, e)))
}

/// Whether the nearest `owner`-named ancestor of `el` is `parent`.
fn belongs_to(el: ElementRef<'_>, owner: &str, parent: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == owner)
        .is_some_and(|a| a.id() == parent.id())
}

/// Cell text without footnote markers, whitespace collapsed.
fn cell_text(cell: ElementRef<'_>) -> String {
    let text: String = cell
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let in_footnote = node
                .ancestors()
                .take_while(|a| a.id() != cell.id())
                .any(|a| a.value().as_element().is_some_and(|e| e.name() == "sup"));
            (!in_footnote).then_some(&**text)
        })
        .collect();

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse every table on the page, in document order.
pub fn extract_tables(html: &str) -> Result<Vec<HtmlTable>> {
    let document = Html::parse_document(html);
    let tables = selector("table")?;
    let rows = selector("tr")?;
    let cells = selector("th, td")?;

    let parsed = document
        .select(&tables)
        .map(|table| {
            let mut parsed = HtmlTable::default();
            for row in table.select(&rows).filter(|r| belongs_to(*r, "table", table)) {
                let row_cells: Vec<(bool, String)> = row
                    .select(&cells)
                    .filter(|c| belongs_to(*c, "tr", row))
                    .map(|c| (c.value().name() == "th", cell_text(c)))
                    .collect();

                if row_cells.is_empty() {
                    continue;
                }
                if parsed.headers.is_empty() && row_cells.iter().all(|(is_header, _)| *is_header) {
                    parsed.headers = row_cells.into_iter().map(|(_, text)| text).collect();
                } else {
                    parsed.rows.push(row_cells.into_iter().map(|(_, text)| text).collect());
                }
            }
            parsed
        })
        .collect();

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <table class="infobox"><tr><th>Founded</th><td>1896</td></tr></table>
        <table class="wikitable sortable" id="constituents">
          <tbody>
            <tr><th>Company</th><th>Exchange</th><th>Symbol<sup>[1]</sup></th></tr>
            <tr><th scope="row"><a href="/wiki/3M">3M</a></th><td>NYSE</td><td><a href="x">MMM</a></td></tr>
            <tr><th scope="row">Johnson &amp; Johnson</th><td>NYSE</td><td>JNJ</td></tr>
            <tr><th scope="row">Empty</th><td>NYSE</td><td> </td></tr>
          </tbody>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_extract_tables_in_order() {
        let tables = extract_tables(PAGE).unwrap();
        assert_eq!(tables.len(), 2);
        assert!(tables[0].headers.is_empty());
        assert_eq!(tables[1].headers, vec!["Company", "Exchange", "Symbol"]);
        assert_eq!(tables[1].rows.len(), 3);
    }

    #[test]
    fn test_row_header_cells_keep_positions() {
        let tables = extract_tables(PAGE).unwrap();
        assert_eq!(tables[1].column("Symbol").unwrap(), vec!["MMM", "JNJ"]);
        assert_eq!(
            tables[1].column("company").unwrap(),
            vec!["3M", "Johnson & Johnson", "Empty"]
        );
    }

    #[test]
    fn test_nested_tables_counted_in_document_order() {
        let page = r#"
            <table class="infobox">
              <tr><td><table><tr><td>logo</td></tr></table></td></tr>
              <tr><th>Exchange</th><td>NYSE</td></tr>
            </table>
            <table>
              <tr><th>Company</th><th>Symbol</th></tr>
              <tr><td>Apple</td><td>AAPL</td></tr>
            </table>
        "#;
        let tables = extract_tables(page).unwrap();

        assert_eq!(tables.len(), 3);
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(tables[0].rows[1], vec!["Exchange", "NYSE"]);
        assert_eq!(tables[1].rows, vec![vec!["logo".to_string()]]);
        assert_eq!(tables[2].column("Symbol").unwrap(), vec!["AAPL"]);
    }

    #[test]
    fn test_missing_column() {
        let tables = extract_tables(PAGE).unwrap();
        assert!(tables[1].column("Ticker").is_none());
    }

    #[test]
    fn test_no_tables() {
        assert!(extract_tables("<p>nothing here</p>").unwrap().is_empty());
    }
}
