//! Startup Nation Finder search results, rendered client-side.

use std::sync::OnceLock;

use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use super::{selector, text_of, Extraction};
use crate::records::{placeholder, Row, UNAVAILABLE};

pub const HEADER: &[&str] = &[
    "Name",
    "Description",
    "Founded",
    "Business Model",
    "Employees",
    "Funding Stage",
    "Total Raised",
    "Tags",
];
pub const LISTING: &str = "a[style='display:flex;']";

pub fn extract(html: &str) -> Extraction {
    static ROW: OnceLock<Selector> = OnceLock::new();

    let doc = Html::parse_document(html);
    let has_next_control = has_next_control(&doc);
    let listings: Vec<_> = doc.select(selector(&ROW, LISTING)).collect();
    if listings.is_empty() {
        return Extraction {
            has_next_control,
            ..Extraction::default()
        };
    }

    Extraction {
        header: Vec::new(),
        rows: Some(listings.into_iter().map(company_row).collect()),
        has_next_control,
    }
}

fn company_row(listing: ElementRef<'_>) -> Row {
    static NAME: OnceLock<Selector> = OnceLock::new();
    static CELL: OnceLock<Selector> = OnceLock::new();
    static TAG: OnceLock<Selector> = OnceLock::new();

    let Some(name) = listing.select(selector(&NAME, ".company-name")).next() else {
        warn!(
            href = listing.value().attr("href").unwrap_or(""),
            "Listing has no company name, recording placeholder"
        );
        return placeholder(HEADER.len());
    };

    let cells: Vec<String> = listing.select(selector(&CELL, ".table-row-item")).map(text_of).collect();
    let positional = |i: usize| -> String {
        cells.get(i).cloned().unwrap_or_else(|| UNAVAILABLE.to_string())
    };
    let tags: Vec<String> = listing.select(selector(&TAG, ".classification")).map(text_of).collect();

    vec![
        Some(text_of(name)),
        Some(cells.first().cloned().unwrap_or_default()),
        Some(positional(1)),
        Some(positional(2)),
        Some(positional(3)),
        Some(positional(4)),
        Some(positional(5)),
        Some(tags.join(", ")),
    ]
}

/// A `<span>Next</span>` whose parent is not marked disabled.
fn has_next_control(doc: &Html) -> bool {
    static SPAN: OnceLock<Selector> = OnceLock::new();

    doc.select(selector(&SPAN, "span"))
        .find(|span| text_of(*span) == "Next")
        .and_then(|span| span.parent().and_then(ElementRef::wrap))
        .map(|control| !control.value().attr("class").unwrap_or("").contains("disabled"))
        .unwrap_or(false)
}
