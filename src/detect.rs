// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change detection.
//!
//! Classifies observed local writes into typed [`Record`]s. Classification
//! is pure: it never touches the stores, the queue or the network, so the
//! same write always yields the same records.
//!
//! # Example
//!
//! ```
//! use backup_sync::detect::{detect, RawWrite};
//! use backup_sync::RecordType;
//! use serde_json::json;
//!
//! let write = RawWrite::key_value("transactions", r#"[{"date":"2024-01-05","desc":"Fuel","spent":"42.50"}]"#);
//! let records = detect(&write);
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].record_type, RecordType::Transaction);
//!
//! // Secrets never become records
//! assert!(detect(&RawWrite::key_value("openai_api_key", r#""sk-123""#)).is_empty());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::descriptor::sanitize_gmail_accounts;
use crate::normalize::{as_text, strip_secrets};
use crate::record::{Record, RecordType};

/// Which kind of local store a write went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteSource {
    /// Document database collection (IndexedDB object store)
    Document,
    /// Key/value store (localStorage), value is a JSON string
    KeyValue,
}

/// A write as seen by the interception layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWrite {
    pub source: WriteSource,
    /// Collection (document stores) or key (key/value stores)
    pub collection: String,
    pub value: Value,
}

impl RawWrite {
    pub fn document(collection: impl Into<String>, value: Value) -> Self {
        Self {
            source: WriteSource::Document,
            collection: collection.into(),
            value,
        }
    }

    /// A key/value write; the raw string is kept and parsed at classification.
    pub fn key_value(key: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            source: WriteSource::KeyValue,
            collection: key.into(),
            value: Value::String(raw.into()),
        }
    }
}

/// How a classified value expands into records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// The value itself is one record
    Single,
    /// One record per array element
    PerElement,
    /// One record per array element that has a `date`
    PerDatedElement,
    /// Object map: one record per entry, key injected as `projectKey`
    PerEntryKeyed,
    /// Object map: one `{staffName, signatureImage}` record per entry
    PerSignature,
    /// `{key, value}` preference record with secrets stripped
    Preference,
    /// Gmail account list, reduced to identity fields
    SanitizedAccounts,
    /// Labour sheet object: `rows` with `month` and non-blank `staff`
    LabourRows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub record_type: RecordType,
    pub shape: Shape,
}

impl Classification {
    const fn new(record_type: RecordType, shape: Shape) -> Self {
        Self { record_type, shape }
    }
}

/// Keys holding UI-only state.
const UI_STATE_MARKERS: [&str; 3] = ["history", "cache", "temp"];
/// Keys holding credentials; never queued.
const SECRET_MARKERS: [&str; 5] = ["api_key", "apikey", "token", "secret", "password"];

pub const STAFF_SIGNATURES_KEY: &str = "timesheet_staff_signatures";
pub const KEYWORD_ALIASES_KEY: &str = "keywordAliases";
pub const GMAIL_ACCOUNTS_KEY: &str = "gmailAccounts";

/// Keys backed up as individual user preferences.
pub const PREFERENCE_KEYS: [&str; 8] = [
    "spendTableSettings",
    "darkMode",
    "completionViewMode",
    "taskColumnWidth",
    "labourBudgetCollapsed",
    "monthStates",
    "payslip_folder_map",
    "payslip_team_members",
];

/// Classify a write. `value` must already be parsed JSON.
#[must_use]
pub fn classify(source: WriteSource, collection: &str, value: &Value) -> Option<Classification> {
    match source {
        WriteSource::KeyValue => classify_key(collection, value),
        WriteSource::Document => classify_collection(collection, value),
    }
}

fn classify_key(key: &str, value: &Value) -> Option<Classification> {
    use RecordType as T;
    use Shape as S;

    let name = key.to_lowercase();
    let has = |needle: &str| name.contains(needle);

    if UI_STATE_MARKERS.iter().any(|m| has(m)) || SECRET_MARKERS.iter().any(|m| has(m)) {
        return None;
    }

    let is_array = value.is_array();
    let is_object = value.is_object();

    if key == STAFF_SIGNATURES_KEY {
        return is_object.then_some(Classification::new(T::StaffSignature, S::PerSignature));
    }
    if key == KEYWORD_ALIASES_KEY {
        return is_object.then_some(Classification::new(T::KeywordAliasSet, S::Single));
    }
    if key == GMAIL_ACCOUNTS_KEY {
        return is_array.then_some(Classification::new(T::GmailAccountList, S::SanitizedAccounts));
    }
    if PREFERENCE_KEYS.contains(&key) {
        return Some(Classification::new(T::UserPreference, S::Preference));
    }

    if has("transaction") && is_array {
        return Some(Classification::new(T::Transaction, S::PerElement));
    }
    if has("gantt") {
        if is_object {
            return Some(Classification::new(T::GanttProject, S::PerEntryKeyed));
        }
        if is_array {
            return Some(Classification::new(T::GanttProject, S::PerElement));
        }
    }
    if has("quote") && is_array {
        return Some(Classification::new(T::Quote, S::PerElement));
    }
    if has("invoice") && is_array {
        return Some(Classification::new(T::InvoiceDocument, S::PerElement));
    }
    if has("client") && is_array {
        return Some(Classification::new(T::Client, S::PerElement));
    }
    if has("timesheet") && is_array {
        return Some(Classification::new(T::TimesheetEntry, S::PerDatedElement));
    }
    if has("price") && is_array {
        return Some(Classification::new(T::PriceListItem, S::PerElement));
    }
    if has("labour") || has("labor") {
        if is_array {
            return Some(Classification::new(T::LabourAllocationEntry, S::PerElement));
        }
        if value.get("rows").is_some_and(Value::is_array) {
            return Some(Classification::new(T::LabourAllocationEntry, S::LabourRows));
        }
        if is_object {
            return Some(Classification::new(T::LabourAllocationEntry, S::Single));
        }
    }
    None
}

fn classify_collection(collection: &str, value: &Value) -> Option<Classification> {
    use RecordType as T;

    let name = collection.to_lowercase();
    let shape = if value.is_array() { Shape::PerElement } else { Shape::Single };

    let record_type = if name.contains("csvfile") {
        T::CsvFile
    } else if name.contains("csvimport") {
        T::SketcherImport
    } else if name.contains("transaction") {
        T::Transaction
    } else if name.contains("gantt") {
        T::GanttProject
    } else if name.contains("project") {
        T::Project
    } else if name.contains("invoice") {
        T::Invoice
    } else if name.contains("quote") {
        T::Quote
    } else if name.contains("client") {
        T::Client
    } else if name.contains("timesheet") {
        T::TimesheetEntry
    } else if name.contains("labour") || name.contains("labor") {
        T::LabourAllocationEntry
    } else {
        return None;
    };
    Some(Classification::new(record_type, shape))
}

/// Classify a write and expand it into records.
#[must_use]
pub fn detect(write: &RawWrite) -> Vec<Record> {
    let parsed;
    let value = match (write.source, &write.value) {
        (WriteSource::KeyValue, Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(v) => {
                parsed = v;
                &parsed
            }
            Err(_) => {
                trace!(key = %write.collection, "Dropping non-JSON key/value write");
                return Vec::new();
            }
        },
        (_, other) => other,
    };

    let Some(class) = classify(write.source, &write.collection, value) else {
        trace!(collection = %write.collection, "Write not classified, ignoring");
        return Vec::new();
    };

    expand(class, &write.collection, value)
        .into_iter()
        .map(|payload| Record::new(class.record_type, payload))
        .collect()
}

fn expand(class: Classification, collection: &str, value: &Value) -> Vec<Value> {
    let elements = || value.as_array().cloned().unwrap_or_default();
    let entries = || value.as_object().cloned().unwrap_or_default();

    match class.shape {
        Shape::Single => vec![value.clone()],
        Shape::PerElement => elements(),
        Shape::PerDatedElement => elements()
            .into_iter()
            .filter(|e| e.get("date").is_some_and(|d| !d.is_null()))
            .collect(),
        Shape::PerEntryKeyed => entries()
            .into_iter()
            .map(|(key, entry)| {
                let mut chart = entry.as_object().cloned().unwrap_or_default();
                chart.insert("projectKey".into(), Value::String(key));
                Value::Object(chart)
            })
            .collect(),
        Shape::PerSignature => entries()
            .into_iter()
            .map(|(staff, image)| {
                let mut sig = Map::new();
                sig.insert("staffName".into(), Value::String(staff));
                sig.insert("signatureImage".into(), image);
                Value::Object(sig)
            })
            .collect(),
        Shape::Preference => {
            let mut pref = Map::new();
            pref.insert("key".into(), Value::String(collection.to_string()));
            pref.insert("value".into(), strip_secrets(value));
            vec![Value::Object(pref)]
        }
        Shape::SanitizedAccounts => vec![sanitize_gmail_accounts(value)],
        Shape::LabourRows => value
            .get("rows")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        let month = row.get("month").is_some_and(|m| !m.is_null());
                        let staff = row
                            .get("staff")
                            .and_then(as_text)
                            .is_some_and(|s| !s.trim().is_empty());
                        month && staff
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kv(key: &str, value: Value) -> Vec<Record> {
        detect(&RawWrite::key_value(key, value.to_string()))
    }

    #[test]
    fn test_ui_state_and_secrets_are_dropped() {
        assert!(kv("transactionHistory", json!([{"date": "x"}])).is_empty());
        assert!(kv("ganttCache", json!({"a": {}})).is_empty());
        assert!(kv("gmail_refresh_token", json!("abc")).is_empty());
        assert!(kv("supabasePassword", json!("abc")).is_empty());
    }

    #[test]
    fn test_non_json_value_is_dropped() {
        assert!(detect(&RawWrite::key_value("transactions", "not json")).is_empty());
    }

    #[test]
    fn test_transactions_expand_per_element() {
        let records = kv("transactions", json!([{"date": "a"}, {"date": "b"}]));
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.record_type == RecordType::Transaction));
    }

    #[test]
    fn test_transaction_object_is_not_classified() {
        assert!(kv("transactions", json!({"date": "a"})).is_empty());
    }

    #[test]
    fn test_gantt_map_injects_project_key() {
        let records = kv("ganttProjects", json!({"survey": {"tasks": []}}));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload, json!({"tasks": [], "projectKey": "survey"}));
    }

    #[test]
    fn test_invoice_key_is_invoice_document() {
        let records = kv("savedInvoices", json!([{"invoiceNumber": "INV-1"}]));
        assert_eq!(records[0].record_type, RecordType::InvoiceDocument);
    }

    #[test]
    fn test_timesheet_requires_date() {
        let records = kv("timesheetEntries", json!([{"date": "2024-01-01"}, {"hours": 3}]));
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_labour_rows_filter_blank_staff() {
        let records = kv(
            "labourSheet",
            json!({"rows": [
                {"month": "2024-01", "staff": "Ana"},
                {"month": "2024-01", "staff": "  "},
                {"staff": "Bo"}
            ]}),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload["staff"], json!("Ana"));
    }

    #[test]
    fn test_labor_spelling_single_object() {
        let records = kv("laborEntry", json!({"month": "2024-02", "staffName": "Cy"}));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type, RecordType::LabourAllocationEntry);
    }

    #[test]
    fn test_staff_signatures_per_entry() {
        let records = kv(STAFF_SIGNATURES_KEY, json!({"Ana": "data:image/png;base64,AA"}));
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].payload,
            json!({"staffName": "Ana", "signatureImage": "data:image/png;base64,AA"})
        );
    }

    #[test]
    fn test_gmail_accounts_never_carry_tokens() {
        let records = kv(
            GMAIL_ACCOUNTS_KEY,
            json!([{"email": "a@b.c", "name": "A", "accessToken": "t"}]),
        );
        assert_eq!(records[0].payload, json!([{"email": "a@b.c", "name": "A"}]));
    }

    #[test]
    fn test_preference_strips_secrets() {
        let records = kv("payslip_folder_map", json!({"Ana": "folder1", "oauthToken": "x"}));
        assert_eq!(records[0].record_type, RecordType::UserPreference);
        assert_eq!(
            records[0].payload,
            json!({"key": "payslip_folder_map", "value": {"Ana": "folder1"}})
        );
    }

    #[test]
    fn test_preference_match_is_exact() {
        assert!(kv("darkModeBackup", json!(true)).is_empty());
        assert_eq!(kv("darkMode", json!(true)).len(), 1);
    }

    #[test]
    fn test_document_precedence() {
        let cases = [
            ("csvFiles", RecordType::CsvFile),
            ("csvImports", RecordType::SketcherImport),
            ("projectTransactions", RecordType::Transaction),
            ("ganttProjects", RecordType::GanttProject),
            ("projects", RecordType::Project),
            ("invoices", RecordType::Invoice),
            ("timesheets", RecordType::TimesheetEntry),
        ];
        for (collection, expected) in cases {
            let class = classify(WriteSource::Document, collection, &json!({})).unwrap();
            assert_eq!(class.record_type, expected, "{collection}");
        }
        assert!(classify(WriteSource::Document, "settings", &json!({})).is_none());
    }

    #[test]
    fn test_document_array_expands() {
        let records = detect(&RawWrite::document("projects", json!([{"projectName": "A"}, {"projectName": "B"}])));
        assert_eq!(records.len(), 2);
    }
}
