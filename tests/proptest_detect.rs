// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests for change detection and record keys.
//!
//! Uses proptest to throw arbitrary writes at the detector and verify it
//! never panics, is deterministic, and keys records only by their
//! natural-key fields.
//!
//! Run with: `cargo test --test proptest_detect`

use proptest::prelude::*;
use serde_json::{json, Value};

use backup_sync::descriptor::descriptor;
use backup_sync::detect::{classify, detect, WriteSource};
use backup_sync::queue::SyncQueue;
use backup_sync::{RawWrite, Record, RecordType};

// =============================================================================
// Strategies
// =============================================================================

fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".{0,12}".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        3,  // depth
        48, // max nodes
        6,  // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::hash_map("[a-zA-Z]{1,10}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

/// Names the detector knows plus random noise.
fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("transactions".to_string()),
        Just("ganttProjects".to_string()),
        Just("quotes".to_string()),
        Just("savedInvoices".to_string()),
        Just("clients".to_string()),
        Just("timesheetEntries".to_string()),
        Just("priceList".to_string()),
        Just("labourAllocations".to_string()),
        Just("timesheet_staff_signatures".to_string()),
        Just("keywordAliases".to_string()),
        Just("gmailAccounts".to_string()),
        Just("monthStates".to_string()),
        Just("projects".to_string()),
        Just("csvFiles".to_string()),
        Just("csvImports".to_string()),
        "[a-zA-Z_]{1,20}",
    ]
}

fn transaction_strategy() -> impl Strategy<Value = Value> {
    (
        1u32..28,
        1u32..12,
        2020u32..2030,
        "[A-Za-z][A-Za-z ]{0,19}",
        0u32..100_000,
    )
        .prop_map(|(d, m, y, description, pence)| {
            json!({
                "date": format!("{d}/{m}/{y}"),
                "description": description,
                "spent": format!("£{}.{:02}", pence / 100, pence % 100),
            })
        })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Detection never panics, whatever the value, and is deterministic.
    #[test]
    fn detect_is_pure(name in name_strategy(), value in arbitrary_json_strategy()) {
        let doc = RawWrite::document(name.clone(), value.clone());
        prop_assert_eq!(detect(&doc), detect(&doc));

        let kv = RawWrite::key_value(name, value.to_string());
        prop_assert_eq!(detect(&kv), detect(&kv));
    }

    /// Every detected record carries the type the classifier chose.
    #[test]
    fn detected_records_match_classification(name in name_strategy(), value in arbitrary_json_strategy()) {
        let records = detect(&RawWrite::key_value(name.clone(), value.to_string()));
        match classify(WriteSource::KeyValue, &name, &value) {
            Some(class) => {
                for record in &records {
                    prop_assert_eq!(record.record_type, class.record_type);
                }
            }
            None => prop_assert!(records.is_empty()),
        }
    }

    /// Non-JSON key/value text is never backed up.
    #[test]
    fn non_json_values_are_ignored(name in name_strategy(), raw in "[a-z]{1,8} [a-z]{1,8}") {
        prop_assert!(detect(&RawWrite::key_value(name, raw)).is_empty());
    }

    /// The dedup key depends only on the natural-key fields.
    #[test]
    fn transaction_key_ignores_other_fields(txn in transaction_strategy(), notes in ".{0,30}", bank in "[A-Z]{2,6}") {
        let desc = descriptor(RecordType::Transaction);
        let plain = Record::new(RecordType::Transaction, txn.clone());

        let mut decorated = txn;
        decorated["notes"] = json!(notes);
        decorated["bank"] = json!(bank);
        let decorated = Record::new(RecordType::Transaction, decorated);

        prop_assert_eq!(desc.dedup_key(&plain), desc.dedup_key(&decorated));
        prop_assert!(!desc.dedup_key(&plain).starts_with('#'));
    }

    /// Building a row is stable for the same record and clock.
    #[test]
    fn rows_are_deterministic(txn in transaction_strategy()) {
        let desc = descriptor(RecordType::Transaction);
        let record = Record::new(RecordType::Transaction, txn);
        let now = chrono::Utc::now();
        prop_assert_eq!(desc.build_row(&record, now).ok(), desc.build_row(&record, now).ok());
    }

    /// The queue holds exactly one entry per distinct key.
    #[test]
    fn queue_len_matches_distinct_keys(txns in prop::collection::vec(transaction_strategy(), 0..30)) {
        let desc = descriptor(RecordType::Transaction);
        let mut queue = SyncQueue::new();
        let mut keys = std::collections::HashSet::new();
        for txn in txns {
            let record = Record::new(RecordType::Transaction, txn);
            keys.insert(desc.dedup_key(&record));
            queue.push(record);
        }
        prop_assert_eq!(queue.len(), keys.len());
    }
}
