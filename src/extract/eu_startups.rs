//! EU-Startups directory listing pages (`div.wpbdp-listing` cards).

use std::sync::OnceLock;

use scraper::{Html, Selector};

use super::{non_empty, selector, text_of, Extraction};
use crate::records::Row;

pub const HEADER: &[&str] = &["Name", "Category", "Based in", "Tags", "Founded"];
pub const LISTING: &str = "div.wpbdp-listing";

pub fn extract(html: &str) -> Extraction {
    static CARD: OnceLock<Selector> = OnceLock::new();
    static TITLE: OnceLock<Selector> = OnceLock::new();
    static FIELD: OnceLock<Selector> = OnceLock::new();
    static LABEL: OnceLock<Selector> = OnceLock::new();
    static VALUE: OnceLock<Selector> = OnceLock::new();
    static LINK: OnceLock<Selector> = OnceLock::new();

    let doc = Html::parse_document(html);
    let cards: Vec<_> = doc.select(selector(&CARD, LISTING)).collect();
    if cards.is_empty() {
        return Extraction::default();
    }

    let rows = cards
        .into_iter()
        .map(|card| {
            let mut row: Row = vec![None; HEADER.len()];
            row[0] = card
                .select(selector(&TITLE, ".listing-title h3 a"))
                .next()
                .map(text_of)
                .and_then(non_empty);

            for field in card.select(selector(&FIELD, "div.wpbdp-field-display")) {
                let Some(label) = field.select(selector(&LABEL, "span.field-label")).next() else {
                    continue;
                };
                let label = normalize_label(&text_of(label));
                let Some(col) = HEADER.iter().position(|h| *h == label) else {
                    continue;
                };
                let Some(value_el) = field.select(selector(&VALUE, "div.value")).next() else {
                    continue;
                };
                let value = text_of(value_el);
                if value.is_empty() {
                    continue;
                }
                row[col] = if label == "Category" {
                    value_el
                        .select(selector(&LINK, "a"))
                        .next()
                        .map(text_of)
                        .or(Some(value))
                } else {
                    Some(value)
                };
            }
            row
        })
        .collect();

    Extraction {
        header: Vec::new(),
        rows: Some(rows),
        has_next_control: false,
    }
}

fn normalize_label(raw: &str) -> String {
    raw.replace(':', "").replace('\u{a0}', " ").trim().to_string()
}
