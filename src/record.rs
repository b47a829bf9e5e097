// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record data structure.
//!
//! A [`Record`] is one unit of user data subject to backup: a type tag, the
//! payload as it lives in local storage, and a last-modified timestamp.
//!
//! # Example
//!
//! ```
//! use backup_sync::{Record, RecordType};
//! use serde_json::json;
//!
//! let record = Record::new(
//!     RecordType::Transaction,
//!     json!({"date": "2024-01-05", "description": "Fuel", "amount": -42.50}),
//! );
//!
//! assert_eq!(record.record_type, RecordType::Transaction);
//! assert_eq!(record.record_type.as_str(), "transaction");
//! assert!(record.last_modified.is_none());
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every kind of user data the engine knows how to back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordType {
    Project,
    CsvFile,
    Invoice,
    SketcherImport,
    GanttProject,
    Transaction,
    LabourAllocationEntry,
    Quote,
    InvoiceDocument,
    Client,
    TimesheetEntry,
    PriceListItem,
    StaffSignature,
    UserPreference,
    KeywordAliasSet,
    GmailAccountList,
}

impl RecordType {
    /// All types, in restore order (primary budget data first).
    pub const ALL: [RecordType; 16] = [
        RecordType::Project,
        RecordType::CsvFile,
        RecordType::Invoice,
        RecordType::SketcherImport,
        RecordType::GanttProject,
        RecordType::Transaction,
        RecordType::LabourAllocationEntry,
        RecordType::Quote,
        RecordType::InvoiceDocument,
        RecordType::Client,
        RecordType::TimesheetEntry,
        RecordType::PriceListItem,
        RecordType::StaffSignature,
        RecordType::UserPreference,
        RecordType::KeywordAliasSet,
        RecordType::GmailAccountList,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::CsvFile => "csv-file",
            Self::Invoice => "invoice",
            Self::SketcherImport => "sketcher-import",
            Self::GanttProject => "gantt-project",
            Self::Transaction => "transaction",
            Self::LabourAllocationEntry => "labour-allocation-entry",
            Self::Quote => "quote",
            Self::InvoiceDocument => "invoice-document",
            Self::Client => "client",
            Self::TimesheetEntry => "timesheet-entry",
            Self::PriceListItem => "price-list-item",
            Self::StaffSignature => "staff-signature",
            Self::UserPreference => "user-preference",
            Self::KeywordAliasSet => "keyword-alias-set",
            Self::GmailAccountList => "gmail-account-list",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown record type '{s}'"))
    }
}

/// A typed unit of user data awaiting (or restored from) backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_type: RecordType,
    /// The record as stored locally
    pub payload: Value,
    /// Explicit modification time; adapters fall back to the clock when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(record_type: RecordType, payload: Value) -> Self {
        Self {
            record_type,
            payload,
            last_modified: None,
        }
    }

    #[must_use]
    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }

    /// Approximate payload size, used for queue depth metrics.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        serde_json::to_vec(&self.payload).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_names_round_trip() {
        for t in RecordType::ALL {
            assert_eq!(t.as_str().parse::<RecordType>().unwrap(), t);
        }
        assert!("spreadsheet".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let encoded = serde_json::to_string(&RecordType::LabourAllocationEntry).unwrap();
        assert_eq!(encoded, "\"labour-allocation-entry\"");
    }

    #[test]
    fn test_all_is_exhaustive_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for t in RecordType::ALL {
            assert!(seen.insert(t));
        }
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn test_size_bytes() {
        let record = Record::new(RecordType::Client, json!({"name": "Acme"}));
        assert_eq!(record.size_bytes(), r#"{"name":"Acme"}"#.len());
    }
}
