use crate::error::{PipelineError, Result};
use crate::logger::ProgressLog;
use crate::structs::{RawTable, Table, TableSelector};
use log::{debug, warn};
use scraper::{ElementRef, Html, Node, Selector};

/// Fetches `url` and scrapes the first table matching `selector`.
///
/// # Arguments
/// * `url` - Page holding the bank ranking table
/// * `selector` - Attribute filter for the `<table>` element
/// * `log` - Progress log; one entry is written on success
///
/// # Errors
/// Returns `PipelineError::Transport` if the request fails or the server
/// answers with a non-success status, and `PipelineError::Parse` if no
/// matching table exists or it has no rows.
pub fn extract(url: &str, selector: &TableSelector, log: &mut ProgressLog) -> Result<RawTable> {
    let html = fetch_html(url)?;
    let table = parse_table(&html, selector)?;
    debug!(
        "Extracted {} rows with columns {:?}",
        table.len(),
        table.columns()
    );
    log.log_progress("Data extraction complete. Initiating Transformation process");
    Ok(table)
}

/// Single blocking GET; no retries.
pub fn fetch_html(url: &str) -> Result<String> {
    debug!("Fetching {url}");
    let response = reqwest::blocking::get(url)?.error_for_status()?;
    let body = response.text()?;
    debug!("Fetched {} bytes", body.len());
    Ok(body)
}

/// Parses the first table in `html` matching `selector` into a [`RawTable`].
///
/// The first row supplies the column names. Cells spanning several columns
/// are repeated once per column. Rows that are empty or still do not match
/// the header width (footnotes, section captions) are skipped.
pub fn parse_table(html: &str, selector: &TableSelector) -> Result<RawTable> {
    let css = selector.to_css();
    let table_selector = Selector::parse(&css)
        .map_err(|e| PipelineError::Parse(format!("invalid table selector `{css}`: {e:?}")))?;

    let document = Html::parse_document(html);
    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| PipelineError::Parse(format!("no table matching `{css}` in document")))?;

    let mut rows = table_rows(table)
        .into_iter()
        .map(row_cells)
        .filter(|cells| !cells.is_empty());

    let header = rows
        .next()
        .ok_or_else(|| PipelineError::Parse(format!("table matching `{css}` has no rows")))?;
    let mut records: Vec<Vec<String>> = Vec::new();
    for (i, record) in rows.enumerate() {
        if record.len() == header.len() {
            records.push(record);
        } else {
            warn!(
                "Skipping table row {}: {} cells but the header has {}",
                i + 1,
                record.len(),
                header.len()
            );
        }
    }

    Table::from_text_rows(header, records)
}

// Direct rows only, so nested tables inside a cell are not flattened in.
fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|row| row.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

fn row_cells(row: ElementRef<'_>) -> Vec<String> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "th" | "td"))
        .flat_map(|cell| {
            let span = cell
                .value()
                .attr("colspan")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(1);
            std::iter::repeat_n(cell_text(cell), span)
        })
        .collect()
}

fn cell_text(cell: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in cell.descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(e) if e.name() == "br" => text.push(' '),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
