//! Parsing of the classroom finder page into [`ReferenceRow`]s.
//!
//! The page is a TablePress table: the first column holds
//! `"<code> - <details>"`, the second holds `"<department>, <address>"`
//! where the address starts at the postal code.

use crate::reference::ReferenceRow;
use html_scraper::{ElementRef, Html, Selector};
use regex::Regex;
use std::sync::LazyLock;

static ROW_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#tablepress-16 > tbody > tr").unwrap());
static DEPARTMENT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.column-1").unwrap());
static ADDRESS_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.column-2").unwrap());

/// From the first digit to the end of the line.
static DIGIT_TAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d.*").unwrap());

/// Parse every classroom row out of the finder page.
///
/// Rows missing either cell are skipped.
pub fn parse_classroom_table(body: &str) -> Vec<ReferenceRow> {
    let html = Html::parse_document(body);
    html.select(&ROW_SEL)
        .filter_map(|tr| {
            let department = stripped_text(tr.select(&DEPARTMENT_SEL).next()?);
            let address = stripped_text(tr.select(&ADDRESS_SEL).next()?);
            Some(parse_row(&department, &address))
        })
        .collect()
}

/// Build a row from the two raw cell texts.
pub fn parse_row(department_cell: &str, address_cell: &str) -> ReferenceRow {
    let (code, details) = department_cell
        .split_once(" - ")
        .unwrap_or((department_cell, ""));

    let (address, before_digits) = match DIGIT_TAIL.find(address_cell) {
        Some(m) => (m.as_str(), &address_cell[..m.start()]),
        None => (address_cell, address_cell),
    };

    let department = before_digits.trim();
    let department = department
        .split_once(',')
        .map_or(department, |(head, _)| head)
        .trim();

    ReferenceRow::new(code, details, department, address)
}

/// Cell text with every text node trimmed and concatenated.
fn stripped_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
