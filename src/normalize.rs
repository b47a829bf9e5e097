// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Value normalization shared by the upload adapters.

use chrono::NaiveDate;
use serde_json::{Map, Value};

/// Parse a currency amount, tolerating symbols, thousands separators and
/// whitespace. Anything unparseable is zero.
///
/// ```
/// use backup_sync::normalize::parse_currency;
/// use serde_json::json;
///
/// assert_eq!(parse_currency(&json!("£1,234.50")), 1234.5);
/// assert_eq!(parse_currency(&json!(-42.5)), -42.5);
/// assert_eq!(parse_currency(&json!("n/a")), 0.0);
/// ```
#[must_use]
pub fn parse_currency(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '£' | '$' | '€' | ',') && !c.is_whitespace())
                .collect();
            parse_leading_float(&cleaned)
        }
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

/// Like JavaScript's `parseFloat`: the longest numeric prefix wins.
fn parse_leading_float(s: &str) -> f64 {
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_digit = false;
    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '.' if !seen_dot => seen_dot = true,
            d if d.is_ascii_digit() => seen_digit = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return 0.0;
    }
    s[..end].parse().unwrap_or(0.0)
}

/// Normalize a localized date to `YYYY-MM-DD`.
///
/// ISO-prefixed strings pass through, `D/M/YYYY` is reordered, anything else
/// is returned unchanged.
///
/// ```
/// use backup_sync::normalize::canonical_date;
///
/// assert_eq!(canonical_date("5/1/2024"), "2024-01-05");
/// assert_eq!(canonical_date("2024-01-05"), "2024-01-05");
/// assert_eq!(canonical_date("last tuesday"), "last tuesday");
/// ```
#[must_use]
pub fn canonical_date(input: &str) -> String {
    let trimmed = input.trim();
    if is_iso_prefixed(trimmed) {
        return trimmed.to_string();
    }

    let head = trimmed.split_whitespace().next().unwrap_or("");
    let parts: Vec<&str> = head.split('/').collect();
    if let [day, month, year] = parts.as_slice() {
        let valid = (1..=2).contains(&day.len())
            && (1..=2).contains(&month.len())
            && year.len() == 4
            && [day, month, year].iter().all(|p| p.chars().all(|c| c.is_ascii_digit()));
        if valid {
            if let (Ok(d), Ok(m), Ok(y)) = (day.parse::<u32>(), month.parse::<u32>(), year.parse::<i32>()) {
                if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                    return date.format("%Y-%m-%d").to_string();
                }
                return format!("{year}-{month:0>2}-{day:0>2}");
            }
        }
    }
    trimmed.to_string()
}

fn is_iso_prefixed(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 10
        && b[..4].iter().all(u8::is_ascii_digit)
        && b[4] == b'-'
        && b[5..7].iter().all(u8::is_ascii_digit)
        && b[7] == b'-'
        && b[8..10].iter().all(u8::is_ascii_digit)
}

/// Field names that must never leave the device.
#[must_use]
pub fn is_secret_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    ["token", "secret", "password", "api_key", "apikey", "credential"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Remove secret-named fields at any depth.
#[must_use]
pub fn strip_secrets(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !is_secret_field(k))
                .map(|(k, v)| (k.clone(), strip_secrets(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_secrets).collect()),
        other => other.clone(),
    }
}

/// First present, non-null, non-empty-string field among `names`.
#[must_use]
pub fn first_present<'a>(payload: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|n| payload.get(*n))
        .find(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
}

/// Render a value as plain text for key/column use.
#[must_use]
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Join sketcher rows (arrays or objects) into CSV text.
#[must_use]
pub fn rows_to_csv(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Array(rows) => rows
            .iter()
            .map(|row| {
                let cells: Vec<String> = match row {
                    Value::Array(cells) => cells.iter().map(cell_text).collect(),
                    Value::Object(map) => map.values().map(cell_text).collect(),
                    other => vec![cell_text(other)],
                };
                cells.join(",")
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => cell_text(other),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Split CSV text back into rows of string cells.
#[must_use]
pub fn csv_to_rows(text: &str) -> Value {
    Value::Array(
        text.split('\n')
            .map(|line| {
                Value::Array(
                    line.trim_end_matches('\r')
                        .split(',')
                        .map(|c| Value::String(c.to_string()))
                        .collect(),
                )
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_currency_variants() {
        assert_eq!(parse_currency(&json!("$ 1,000")), 1000.0);
        assert_eq!(parse_currency(&json!("€-3.25")), -3.25);
        assert_eq!(parse_currency(&json!("12.5abc")), 12.5);
        assert_eq!(parse_currency(&json!("")), 0.0);
        assert_eq!(parse_currency(&Value::Null), 0.0);
    }

    #[test]
    fn test_date_padding() {
        assert_eq!(canonical_date("05/01/2024"), "2024-01-05");
        assert_eq!(canonical_date("1/12/2023 10:15"), "2023-12-01");
        assert_eq!(canonical_date("2024-03-01T10:00:00Z"), "2024-03-01T10:00:00Z");
    }

    #[test]
    fn test_date_out_of_range_is_still_reordered() {
        assert_eq!(canonical_date("31/2/2024"), "2024-02-31");
    }

    #[test]
    fn test_strip_secrets_nested() {
        let value = json!({
            "email": "a@b.c",
            "access_token": "x",
            "nested": {"refreshToken": "y", "keep": 1},
            "list": [{"clientSecret": "z", "name": "n"}]
        });
        assert_eq!(
            strip_secrets(&value),
            json!({"email": "a@b.c", "nested": {"keep": 1}, "list": [{"name": "n"}]})
        );
    }

    #[test]
    fn test_first_present_skips_empty() {
        let map = json!({"a": "", "b": null, "c": "x"});
        let map = map.as_object().unwrap();
        assert_eq!(first_present(map, &["a", "b", "c"]), Some(&json!("x")));
        assert_eq!(first_present(map, &["a", "b"]), None);
    }

    #[test]
    fn test_csv_conversion() {
        let rows = json!([["species", "count"], ["cod", 3]]);
        let text = rows_to_csv(&rows);
        assert_eq!(text, "species,count\ncod,3");
        assert_eq!(csv_to_rows(&text), json!([["species", "count"], ["cod", "3"]]));
    }
}
