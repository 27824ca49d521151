use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use rusqlite::types::Value;
use tracing::warn;
use unicode_general_category::{get_general_category, GeneralCategory};

/// Cells that mean "no value" in the CSVs we load, besides the empty string.
const NULL_MARKERS: &[&str] = &[
    "N/A", "n/a", "NA", "#N/A", "NULL", "null", "NaN", "nan", "None", "<NA>",
];

/// Turns raw CSV cells into values safe to bind: NULL, an integer, or a
/// bounded string with no control characters.
pub struct Sanitizer {
    numeric: HashSet<String>,
    shorthand: HashSet<String>,
    max_len: usize,
}

impl Sanitizer {
    pub fn new(numeric: &[String], shorthand: &[String], max_len: usize) -> Self {
        Self {
            numeric: numeric.iter().cloned().collect(),
            shorthand: shorthand.iter().cloned().collect(),
            max_len,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Clean one row. `index` is only used to point warnings at the input row.
    pub fn sanitize(&self, index: usize, header: &[String], row: &[Option<&[u8]>]) -> Vec<Value> {
        header
            .iter()
            .enumerate()
            .map(|(col, name)| self.field(index, name, row.get(col).copied().flatten()))
            .collect()
    }

    fn field(&self, index: usize, name: &str, raw: Option<&[u8]>) -> Value {
        let Some(raw) = raw else {
            return Value::Null;
        };
        if raw.is_empty() || NULL_MARKERS.iter().any(|m| m.as_bytes() == raw) {
            return Value::Null;
        }

        if self.numeric.contains(name) {
            return match std::str::from_utf8(raw).ok().and_then(|s| s.trim().parse::<i64>().ok()) {
                Some(n) => Value::Integer(n),
                None => {
                    warn!(row = index, field = name, value = %String::from_utf8_lossy(raw), "Invalid numeric value, storing NULL");
                    Value::Null
                }
            };
        }

        if self.shorthand.contains(name) {
            return match std::str::from_utf8(raw).ok().and_then(parse_shorthand) {
                Some(n) => Value::Integer(n),
                None => {
                    warn!(row = index, field = name, value = %String::from_utf8_lossy(raw), "Invalid shorthand number, storing NULL");
                    Value::Null
                }
            };
        }

        match std::str::from_utf8(raw) {
            Ok(text) => Value::Text(clean_text(text, self.max_len)),
            Err(_) => {
                warn!(row = index, field = name, "Invalid UTF-8, storing empty string");
                Value::Text(String::new())
            }
        }
    }
}

/// Trim, double single quotes, cut to `max_len` characters, drop category-C characters.
///
/// A doubled quote is never split by the cut: if only one slot is left for it, it is dropped.
pub fn clean_text(text: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_len * 4));
    let mut used = 0;
    for c in text.trim().chars() {
        let width = if c == '\'' { 2 } else { 1 };
        if used + width > max_len {
            break;
        }
        used += width;
        if c == '\'' {
            out.push_str("''");
        } else if !is_other_category(c) {
            out.push(c);
        }
    }
    out
}

/// Unicode general category C: control, format, private use, surrogate, unassigned.
fn is_other_category(c: char) -> bool {
    matches!(
        get_general_category(c),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::PrivateUse
            | GeneralCategory::Surrogate
            | GeneralCategory::Unassigned
    )
}

/// Parse amounts like `$2.5M`, `500K`, `€1,200`. Fractions below the unit are truncated.
pub fn parse_shorthand(raw: &str) -> Option<i64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(-)?(\d*)(?:\.(\d*))?([KkMm])?$").unwrap());

    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',') && !c.is_whitespace())
        .collect();
    let caps = re.captures(&compact)?;

    let whole = caps.get(2).map_or("", |m| m.as_str());
    let frac = caps.get(3).map_or("", |m| m.as_str());
    if whole.is_empty() && frac.is_empty() {
        return None;
    }

    let exp: usize = match caps.get(4).map(|m| m.as_str()) {
        Some("K") | Some("k") => 3,
        Some("M") | Some("m") => 6,
        _ => 0,
    };

    // Shift the decimal point right by `exp` digits, dropping what remains after it.
    let mut digits = String::with_capacity(whole.len() + exp);
    digits.push_str(whole);
    let shifted: String = frac.chars().chain(std::iter::repeat('0')).take(exp).collect();
    digits.push_str(&shifted);

    let magnitude: i64 = if digits.is_empty() { 0 } else { digits.parse().ok()? };
    Some(if caps.get(1).is_some() { -magnitude } else { magnitude })
}
