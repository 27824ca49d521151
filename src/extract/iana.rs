//! IANA root zone database: a single `table.iana-table`.

use std::sync::OnceLock;

use scraper::{Html, Selector};

use super::{non_empty, selector, text_of, Extraction};
use crate::records::Row;

pub const HEADER: &[&str] = &["Domain", "Type", "Sponsoring Organization"];
pub const TABLE: &str = "table.iana-table";

pub fn extract(html: &str) -> Extraction {
    static TABLE_SEL: OnceLock<Selector> = OnceLock::new();
    static TH: OnceLock<Selector> = OnceLock::new();
    static TR: OnceLock<Selector> = OnceLock::new();
    static TD: OnceLock<Selector> = OnceLock::new();

    let doc = Html::parse_document(html);
    let Some(table) = doc.select(selector(&TABLE_SEL, TABLE)).next() else {
        return Extraction::default();
    };

    let header: Vec<String> = table
        .select(selector(&TH, "th"))
        .map(text_of)
        .filter(|h| !h.is_empty())
        .collect();

    let rows: Vec<Row> = table
        .select(selector(&TR, "tr"))
        .map(|tr| {
            tr.select(selector(&TD, "td"))
                .map(|td| non_empty(text_of(td)))
                .collect::<Row>()
        })
        .filter(|row| row.iter().any(Option::is_some))
        .collect();

    Extraction {
        header,
        rows: Some(rows),
        has_next_control: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::fixture;

    #[test]
    fn reads_header_and_rows() {
        let page = extract(&fixture("iana"));
        assert_eq!(page.header, vec!["Domain", "Type", "TLD Manager"]);

        let rows = page.rows.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0].as_deref(), Some(".aaa"));
        assert_eq!(rows[0][2].as_deref(), Some("American Automobile Association, Inc."));
        assert!(!page.has_next_control);
    }

    #[test]
    fn empty_cell_keeps_its_column() {
        let rows = extract(&fixture("iana")).rows.unwrap();
        let unassigned = &rows[2];
        assert_eq!(unassigned[0].as_deref(), Some(".zzz"));
        assert_eq!(unassigned[1].as_deref(), Some("generic"));
        assert_eq!(unassigned[2], None);
    }

    #[test]
    fn missing_table_is_no_data() {
        let page = extract("<html><body><p>maintenance</p></body></html>");
        assert!(page.rows.is_none());
        assert!(page.header.is_empty());
    }
}
