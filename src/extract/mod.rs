pub mod eu_startups;
pub mod iana;
pub mod startup_nation;

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};

use crate::records::Row;

/// Which page layout a source serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractorKind {
    IanaTable,
    EuStartups,
    StartupNation,
}

/// What one page yielded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Header discovered on the page; empty means "use the source default".
    pub header: Vec<String>,
    /// `None` when the listing container is missing from the page.
    pub rows: Option<Vec<Row>>,
    /// A "Next" control exists and is not disabled.
    pub has_next_control: bool,
}

impl ExtractorKind {
    pub fn default_header(self) -> Vec<String> {
        let fields: &[&str] = match self {
            ExtractorKind::IanaTable => iana::HEADER,
            ExtractorKind::EuStartups => eu_startups::HEADER,
            ExtractorKind::StartupNation => startup_nation::HEADER,
        };
        fields.iter().map(|f| f.to_string()).collect()
    }

    /// CSS selector for the elements that must be present once a page has rendered.
    pub fn listing_selector(self) -> &'static str {
        match self {
            ExtractorKind::IanaTable => iana::TABLE,
            ExtractorKind::EuStartups => eu_startups::LISTING,
            ExtractorKind::StartupNation => startup_nation::LISTING,
        }
    }

    pub fn extract(self, html: &str) -> Extraction {
        match self {
            ExtractorKind::IanaTable => iana::extract(html),
            ExtractorKind::EuStartups => eu_startups::extract(html),
            ExtractorKind::StartupNation => startup_nation::extract(html),
        }
    }
}

/// Parse a selector literal once and keep it for the life of the process.
pub(crate) fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("selector literal must parse"))
}

/// Visible text of an element with whitespace runs collapsed to single spaces.
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    static WS: OnceLock<Regex> = OnceLock::new();
    let ws = WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    let raw: String = el.text().collect();
    ws.replace_all(raw.trim(), " ").into_owned()
}

/// `Some(text)` unless the text is empty.
pub(crate) fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
pub(crate) fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
}
