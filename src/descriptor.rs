// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-type backup descriptors.
//!
//! Each [`RecordType`] maps to one static [`Descriptor`]: the remote table,
//! its natural-key columns, how local fields become columns, an optional blob
//! and where restored rows land locally. A single generic upload routine and
//! a single generic restore routine are driven entirely by this table.
//!
//! # Example
//!
//! ```
//! use backup_sync::{descriptor, Record, RecordType};
//! use chrono::Utc;
//! use serde_json::json;
//!
//! let desc = descriptor::descriptor(RecordType::Transaction);
//! assert_eq!(desc.table, "transactions");
//! assert_eq!(desc.conflict_target(), vec!["user_id", "date", "description", "amount"]);
//!
//! let record = Record::new(
//!     RecordType::Transaction,
//!     json!({"date": "05/01/2024", "desc": "Fuel", "spent": "£42.50"}),
//! );
//! let row = desc.build_row(&record, Utc::now()).unwrap();
//! assert_eq!(row["date"], json!("2024-01-05"));
//! assert_eq!(row["amount"], json!(-42.5));
//! ```

use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::SyncError;
use crate::normalize::{
    as_text, canonical_date, csv_to_rows, first_present, parse_currency, rows_to_csv,
};
use crate::record::{Record, RecordType};

/// Main budget database (IndexedDB name and schema version in the browser build).
pub const BUDGET_DB: (&str, u32) = ("PEBLGrantsBudgets", 6);
/// Species sketcher database.
pub const SKETCHER_DB: (&str, u32) = ("MarineSpeciesSketcherDB", 1);
/// Collections whose emptiness signals a wiped store.
pub const PRIMARY_COLLECTIONS: [&str; 2] = ["projects", "csvFiles"];
/// Remote table probed for the cache-clear existence check.
pub const PRIMARY_TABLE: &str = "projects";
/// Ownership column carried by every remote row.
pub const OWNER_COLUMN: &str = "user_id";

const KEY_SEPARATOR: char = '\u{1f}';

/// How a column value is derived from the first present source field.
#[derive(Debug, Clone, Copy)]
pub enum Conversion {
    /// Copied as text; missing stays null
    Text,
    /// Copied as text; missing becomes the given default
    TextOr(&'static str),
    /// Currency-tolerant number; missing becomes the default
    Number(f64),
    /// Localized date → `YYYY-MM-DD`
    Date,
    /// Copied as-is; missing becomes the record timestamp
    Timestamp,
    /// Always the record timestamp
    Now,
    /// Copied verbatim (arrays, objects)
    Json,
    /// The untouched local payload
    Payload,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sources: &'static [&'static str],
    pub conversion: Conversion,
}

impl Column {
    const fn new(name: &'static str, sources: &'static [&'static str], conversion: Conversion) -> Self {
        Self { name, sources, conversion }
    }
}

/// Encoding of blob content inside the local payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    /// UTF-8 text (CSV uploads)
    Text,
    /// Base64 string (PDF/image bytes)
    Base64,
    /// Array of rows, stored remotely as CSV text
    CsvRows,
}

#[derive(Debug, Clone, Copy)]
pub struct BlobSpec {
    pub bucket: &'static str,
    /// Local payload field holding the content
    pub field: &'static str,
    pub kind: BlobKind,
    pub content_type: &'static str,
    /// Row column naming the file
    pub name_column: &'static str,
    /// Row column receiving the storage path
    pub path_column: &'static str,
    /// Row column receiving the byte size, if tracked
    pub size_column: Option<&'static str>,
}

impl BlobSpec {
    /// Extract the blob bytes from a local payload.
    #[must_use]
    pub fn encode(&self, payload: &Value) -> Option<Vec<u8>> {
        let raw = payload.get(self.field).filter(|v| !v.is_null())?;
        match self.kind {
            BlobKind::Text => match raw {
                Value::String(text) => Some(text.as_bytes().to_vec()),
                // Older hosts stored parsed rows under the text field
                rows => Some(rows_to_csv(rows).into_bytes()),
            },
            BlobKind::CsvRows => Some(rows_to_csv(raw).into_bytes()),
            BlobKind::Base64 => match raw {
                Value::String(s) => {
                    let body = s.split_once(";base64,").map_or(s.as_str(), |(_, b)| b);
                    Some(
                        base64::engine::general_purpose::STANDARD
                            .decode(body)
                            .unwrap_or_else(|_| s.as_bytes().to_vec()),
                    )
                }
                Value::Array(bytes) => Some(
                    bytes
                        .iter()
                        .filter_map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                        .collect(),
                ),
                _ => None,
            },
        }
    }

    /// Turn downloaded bytes back into the local payload field.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> Value {
        match self.kind {
            BlobKind::Text => Value::String(String::from_utf8_lossy(bytes).into_owned()),
            BlobKind::CsvRows => csv_to_rows(&String::from_utf8_lossy(bytes)),
            BlobKind::Base64 => Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }
}

/// Where restored records are written.
#[derive(Debug, Clone, Copy)]
pub enum LocalTarget {
    /// One document per row in a document-store collection
    Document {
        db: (&'static str, u32),
        collection: &'static str,
    },
    /// All rows aggregated into one JSON array under a key
    KeyArray { key: &'static str },
    /// All rows aggregated into one JSON object under a key
    KeyMap {
        key: &'static str,
        key_field: &'static str,
        value_field: &'static str,
    },
    /// Each row under its own key
    KeyPerRow {
        key_field: &'static str,
        value_field: &'static str,
    },
    /// The single row's local value under a fixed key
    KeyValue { key: &'static str },
}

/// Declarative backup description for one record type.
#[derive(Debug)]
pub struct Descriptor {
    pub record_type: RecordType,
    pub table: &'static str,
    /// Natural-key columns (the owner column is implied)
    pub natural_key: &'static [&'static str],
    /// Columns that must be present beyond the natural key
    pub required: &'static [&'static str],
    pub columns: &'static [Column],
    pub blob: Option<BlobSpec>,
    /// Payload normalization run before column mapping
    pub prepare: Option<fn(&Value) -> Value>,
    /// Column holding the full local payload, restored as the base object
    pub snapshot_column: Option<&'static str>,
    /// `(local field, column)` pairs overlaid on restore
    pub restore_fields: &'static [(&'static str, &'static str)],
    pub local: LocalTarget,
}

impl Descriptor {
    /// Conflict target for upserts: owner plus natural key.
    #[must_use]
    pub fn conflict_target(&self) -> Vec<&'static str> {
        std::iter::once(OWNER_COLUMN)
            .chain(self.natural_key.iter().copied())
            .collect()
    }

    /// Normalized payload the columns are read from.
    #[must_use]
    pub fn prepared(&self, payload: &Value) -> Value {
        match self.prepare {
            Some(prepare) => prepare(payload),
            None => payload.clone(),
        }
    }

    /// Map a record to its remote row (without owner or blob columns).
    ///
    /// Fails with [`SyncError::Validation`] when a natural-key or required
    /// column ends up empty.
    pub fn build_row(&self, record: &Record, now: DateTime<Utc>) -> Result<Map<String, Value>, SyncError> {
        let prepared = self.prepared(&record.payload);
        let empty = Map::new();
        let fields = prepared.as_object().unwrap_or(&empty);
        let stamp = record.last_modified.unwrap_or(now);

        let mut row = Map::new();
        for column in self.columns {
            let value = convert(column, fields, &record.payload, stamp);
            row.insert(column.name.to_string(), value);
        }

        for &field in self.natural_key.iter().chain(self.required.iter()) {
            if is_blank(row.get(field)) {
                return Err(SyncError::Validation {
                    record_type: self.record_type,
                    field,
                });
            }
        }
        Ok(row)
    }

    /// Stable natural-key string for a built row.
    #[must_use]
    pub fn natural_key_of(&self, row: &Map<String, Value>) -> Option<String> {
        let mut parts = Vec::with_capacity(self.natural_key.len());
        for column in self.natural_key {
            parts.push(as_text(row.get(*column)?)?);
        }
        Some(parts.join(&KEY_SEPARATOR.to_string()))
    }

    /// Dedup key for a queued record: the natural key when derivable,
    /// otherwise a content hash so malformed records still reach validation.
    #[must_use]
    pub fn dedup_key(&self, record: &Record) -> String {
        // Epoch stamp keeps the key independent of wall time
        let row = self.build_row(record, DateTime::<Utc>::default()).ok();
        match row.as_ref().and_then(|r| self.natural_key_of(r)) {
            Some(key) => key,
            None => format!("#{}", content_hash(&record.payload)),
        }
    }

    /// Rebuild the local shape of a remote row.
    #[must_use]
    pub fn to_local(&self, row: &Map<String, Value>, blob: Option<&[u8]>) -> Value {
        let mut local = match self.snapshot_column {
            Some(column) => row.get(column).cloned().unwrap_or(Value::Null),
            None => Value::Object(Map::new()),
        };

        if !self.restore_fields.is_empty() || blob.is_some() {
            if !local.is_object() {
                local = Value::Object(Map::new());
            }
            if let Value::Object(ref mut map) = local {
                for (field, column) in self.restore_fields {
                    if let Some(value) = row.get(*column).filter(|v| !v.is_null()) {
                        map.insert((*field).to_string(), value.clone());
                    }
                }
                if let (Some(spec), Some(bytes)) = (self.blob.as_ref(), blob) {
                    map.insert(spec.field.to_string(), spec.decode(bytes));
                }
            }
        }
        local
    }
}

/// SHA-256 of the canonical (key-sorted) JSON encoding.
#[must_use]
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

fn convert(column: &Column, fields: &Map<String, Value>, payload: &Value, stamp: DateTime<Utc>) -> Value {
    let source = first_present(fields, column.sources);
    let stamp_text = || Value::String(stamp.to_rfc3339_opts(SecondsFormat::Millis, true));
    match column.conversion {
        Conversion::Text => source.and_then(as_text).map_or(Value::Null, Value::String),
        Conversion::TextOr(default) => Value::String(
            source.and_then(as_text).unwrap_or_else(|| default.to_string()),
        ),
        Conversion::Number(default) => {
            let n = source.map_or(default, parse_currency);
            serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
        }
        Conversion::Date => source
            .and_then(as_text)
            .map_or(Value::Null, |s| Value::String(canonical_date(&s))),
        Conversion::Timestamp => source.cloned().unwrap_or_else(stamp_text),
        Conversion::Now => stamp_text(),
        Conversion::Json => source.cloned().unwrap_or(Value::Null),
        Conversion::Payload => payload.clone(),
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

/// Signed amount from `amount`, or `spent` (negative) / `received` (positive).
fn prepare_transaction(payload: &Value) -> Value {
    let Some(fields) = payload.as_object() else {
        return payload.clone();
    };
    let mut out = fields.clone();

    let amount = match fields.get("amount").filter(|v| !v.is_null()) {
        Some(amount) => parse_currency(amount),
        None if truthy(fields.get("spent")) => -parse_currency(&fields["spent"]).abs(),
        None if truthy(fields.get("received")) => parse_currency(&fields["received"]).abs(),
        None => 0.0,
    };
    if let Some(n) = serde_json::Number::from_f64(amount) {
        out.insert("amount".into(), Value::Number(n));
    }
    Value::Object(out)
}

/// Project key falls back to the chart name, then `default`.
fn prepare_gantt(payload: &Value) -> Value {
    let Some(fields) = payload.as_object() else {
        return payload.clone();
    };
    let mut out = fields.clone();
    let key = first_present(fields, &["projectKey", "name"])
        .and_then(as_text)
        .unwrap_or_else(|| "default".to_string());
    out.insert("projectKey".into(), Value::String(key));
    if !out.contains_key("tasks") {
        out.insert("tasks".into(), Value::Array(Vec::new()));
    }
    Value::Object(out)
}

/// Keep only account identity; OAuth material never leaves the device.
#[must_use]
pub fn sanitize_gmail_accounts(payload: &Value) -> Value {
    let accounts = match payload {
        Value::Array(items) => items.as_slice(),
        _ => return Value::Array(Vec::new()),
    };
    Value::Array(
        accounts
            .iter()
            .map(|account| {
                let mut clean = Map::new();
                for field in ["email", "name"] {
                    if let Some(v) = account.get(field) {
                        clean.insert(field.to_string(), v.clone());
                    }
                }
                Value::Object(clean)
            })
            .collect(),
    )
}

static PROJECT: Descriptor = Descriptor {
    record_type: RecordType::Project,
    table: "projects",
    natural_key: &["project_name"],
    required: &[],
    columns: &[
        Column::new("project_name", &["projectName"], Conversion::Text),
        Column::new("project_number", &["projectNumber"], Conversion::Text),
        Column::new("budget_data", &[], Conversion::Payload),
        Column::new("last_modified", &["lastModified"], Conversion::Timestamp),
    ],
    blob: None,
    prepare: None,
    snapshot_column: Some("budget_data"),
    restore_fields: &[
        ("projectName", "project_name"),
        ("projectNumber", "project_number"),
        ("lastModified", "last_modified"),
    ],
    local: LocalTarget::Document { db: BUDGET_DB, collection: "projects" },
};

static CSV_FILE: Descriptor = Descriptor {
    record_type: RecordType::CsvFile,
    table: "csv_files",
    natural_key: &["file_name"],
    required: &[],
    columns: &[
        Column::new("file_name", &["fileName"], Conversion::Text),
        Column::new("upload_date", &["uploadDate"], Conversion::Timestamp),
    ],
    blob: Some(BlobSpec {
        bucket: "csv-files",
        field: "data",
        kind: BlobKind::Text,
        content_type: "text/csv",
        name_column: "file_name",
        path_column: "file_path",
        size_column: Some("file_size"),
    }),
    prepare: None,
    snapshot_column: None,
    restore_fields: &[
        ("fileName", "file_name"),
        ("uploadDate", "upload_date"),
        ("fileSize", "file_size"),
    ],
    local: LocalTarget::Document { db: BUDGET_DB, collection: "csvFiles" },
};

static INVOICE: Descriptor = Descriptor {
    record_type: RecordType::Invoice,
    table: "invoices",
    natural_key: &["filename"],
    required: &[],
    columns: &[
        Column::new("filename", &["filename"], Conversion::Text),
        Column::new("transaction_index", &["transactionIndex"], Conversion::Json),
        Column::new("gmail_message_id", &["gmailMessageId"], Conversion::Text),
        Column::new("upload_date", &["uploadDate"], Conversion::Timestamp),
    ],
    blob: Some(BlobSpec {
        bucket: "invoices",
        field: "blob",
        kind: BlobKind::Base64,
        content_type: "application/octet-stream",
        name_column: "filename",
        path_column: "file_path",
        size_column: None,
    }),
    prepare: None,
    snapshot_column: None,
    restore_fields: &[
        ("filename", "filename"),
        ("uploadDate", "upload_date"),
        ("transactionIndex", "transaction_index"),
        ("gmailMessageId", "gmail_message_id"),
    ],
    local: LocalTarget::Document { db: BUDGET_DB, collection: "invoices" },
};

static SKETCHER_IMPORT: Descriptor = Descriptor {
    record_type: RecordType::SketcherImport,
    table: "sketcher_csv_imports",
    natural_key: &["file_name"],
    required: &[],
    columns: &[
        Column::new("file_name", &["fileName"], Conversion::Text),
        Column::new("row_count", &["rowCount"], Conversion::Json),
        Column::new("upload_date", &["uploadDate"], Conversion::Timestamp),
    ],
    blob: Some(BlobSpec {
        bucket: "sketcher-csvs",
        field: "data",
        kind: BlobKind::CsvRows,
        content_type: "text/csv",
        name_column: "file_name",
        path_column: "file_path",
        size_column: None,
    }),
    prepare: None,
    snapshot_column: None,
    restore_fields: &[
        ("fileName", "file_name"),
        ("uploadDate", "upload_date"),
        ("rowCount", "row_count"),
    ],
    local: LocalTarget::Document { db: SKETCHER_DB, collection: "csvImports" },
};

static GANTT_PROJECT: Descriptor = Descriptor {
    record_type: RecordType::GanttProject,
    table: "gantt_projects",
    natural_key: &["project_key"],
    required: &[],
    columns: &[
        Column::new("project_key", &["projectKey"], Conversion::Text),
        Column::new("project_name", &["name", "projectName"], Conversion::Text),
        Column::new("tasks", &["tasks"], Conversion::Json),
        Column::new("gantt_data", &[], Conversion::Payload),
    ],
    blob: None,
    prepare: Some(prepare_gantt),
    snapshot_column: Some("gantt_data"),
    restore_fields: &[],
    local: LocalTarget::KeyArray { key: "ganttProjects" },
};

static TRANSACTION: Descriptor = Descriptor {
    record_type: RecordType::Transaction,
    table: "transactions",
    natural_key: &["date", "description", "amount"],
    required: &[],
    columns: &[
        Column::new("date", &["date"], Conversion::Date),
        Column::new("description", &["description", "desc"], Conversion::Text),
        Column::new("amount", &["amount"], Conversion::Number(0.0)),
        Column::new("bank", &["bank"], Conversion::Text),
        Column::new("category", &["category", "type"], Conversion::Text),
        Column::new("allocation", &["allocation", "project"], Conversion::Text),
        Column::new("invoice_filename", &["invoice", "invoiceFile"], Conversion::Text),
        Column::new("notes", &["notes"], Conversion::Text),
        Column::new("transaction_data", &[], Conversion::Payload),
    ],
    blob: None,
    prepare: Some(prepare_transaction),
    snapshot_column: Some("transaction_data"),
    restore_fields: &[],
    local: LocalTarget::KeyArray { key: "transactions" },
};

static LABOUR_ALLOCATION: Descriptor = Descriptor {
    record_type: RecordType::LabourAllocationEntry,
    table: "labour_allocation_entries",
    natural_key: &["month", "staff_name"],
    required: &[],
    columns: &[
        Column::new("month", &["month"], Conversion::Text),
        Column::new("staff_name", &["staffName", "staff"], Conversion::Text),
        Column::new("gross_pay", &["grossPay", "gross"], Conversion::Number(0.0)),
        Column::new("fte", &["fte"], Conversion::Number(1.0)),
        Column::new("project_allocations", &["allocations", "projects"], Conversion::Json),
        Column::new("entry_data", &[], Conversion::Payload),
    ],
    blob: None,
    prepare: None,
    snapshot_column: Some("entry_data"),
    restore_fields: &[],
    local: LocalTarget::KeyArray { key: "labourAllocations" },
};

static QUOTE: Descriptor = Descriptor {
    record_type: RecordType::Quote,
    table: "quotes",
    natural_key: &["quote_number"],
    required: &[],
    columns: &[
        Column::new("quote_number", &["quoteNumber", "number"], Conversion::Text),
        Column::new("client_name", &["clientName", "client"], Conversion::Text),
        Column::new("client_organization", &["clientOrganization", "organization"], Conversion::Text),
        Column::new("client_address", &["clientAddress", "address"], Conversion::Text),
        Column::new("quote_date", &["quoteDate", "date"], Conversion::Date),
        Column::new("valid_until", &["validUntil"], Conversion::Date),
        Column::new("items", &["items"], Conversion::Json),
        Column::new("subtotal", &["subtotal"], Conversion::Number(0.0)),
        Column::new("vat", &["vat"], Conversion::Number(0.0)),
        Column::new("total", &["total"], Conversion::Number(0.0)),
        Column::new("notes", &["notes"], Conversion::Text),
        Column::new("status", &["status"], Conversion::TextOr("draft")),
        Column::new("quote_data", &[], Conversion::Payload),
    ],
    blob: None,
    prepare: None,
    snapshot_column: Some("quote_data"),
    restore_fields: &[],
    local: LocalTarget::KeyArray { key: "quotes" },
};

static INVOICE_DOCUMENT: Descriptor = Descriptor {
    record_type: RecordType::InvoiceDocument,
    table: "saved_invoices",
    natural_key: &["invoice_number"],
    required: &[],
    columns: &[
        Column::new("invoice_number", &["invoiceNumber", "number"], Conversion::Text),
        Column::new("client_name", &["clientName", "client"], Conversion::Text),
        Column::new("client_organization", &["clientOrganization", "organization"], Conversion::Text),
        Column::new("client_address", &["clientAddress", "address"], Conversion::Text),
        Column::new("invoice_date", &["invoiceDate", "date"], Conversion::Date),
        Column::new("due_date", &["dueDate"], Conversion::Date),
        Column::new("items", &["items"], Conversion::Json),
        Column::new("subtotal", &["subtotal"], Conversion::Number(0.0)),
        Column::new("vat", &["vat"], Conversion::Number(0.0)),
        Column::new("total", &["total"], Conversion::Number(0.0)),
        Column::new("notes", &["notes"], Conversion::Text),
        Column::new("status", &["status"], Conversion::TextOr("draft")),
        Column::new("invoice_data", &[], Conversion::Payload),
    ],
    blob: None,
    prepare: None,
    snapshot_column: Some("invoice_data"),
    restore_fields: &[],
    local: LocalTarget::KeyArray { key: "savedInvoices" },
};

static CLIENT: Descriptor = Descriptor {
    record_type: RecordType::Client,
    table: "clients",
    natural_key: &["client_name", "organization"],
    required: &[],
    columns: &[
        Column::new("client_name", &["name", "clientName"], Conversion::Text),
        Column::new("organization", &["organization"], Conversion::TextOr("")),
        Column::new("email", &["email"], Conversion::Text),
        Column::new("phone", &["phone"], Conversion::Text),
        Column::new("address", &["address"], Conversion::Text),
        Column::new("notes", &["notes"], Conversion::Text),
        Column::new("client_data", &[], Conversion::Payload),
    ],
    blob: None,
    prepare: None,
    snapshot_column: Some("client_data"),
    restore_fields: &[],
    local: LocalTarget::KeyArray { key: "clients" },
};

static TIMESHEET_ENTRY: Descriptor = Descriptor {
    record_type: RecordType::TimesheetEntry,
    table: "timesheets",
    natural_key: &["date", "staff_name", "project"],
    required: &[],
    columns: &[
        Column::new("date", &["date"], Conversion::Date),
        Column::new("staff_name", &["staffName", "staff"], Conversion::Text),
        Column::new("project", &["project"], Conversion::TextOr("")),
        Column::new("hours", &["hours"], Conversion::Number(0.0)),
        Column::new("task_description", &["task", "description"], Conversion::Text),
        Column::new("notes", &["notes"], Conversion::Text),
        Column::new("timesheet_data", &[], Conversion::Payload),
    ],
    blob: None,
    prepare: None,
    snapshot_column: Some("timesheet_data"),
    restore_fields: &[],
    local: LocalTarget::KeyArray { key: "timesheetEntries" },
};

static PRICE_LIST_ITEM: Descriptor = Descriptor {
    record_type: RecordType::PriceListItem,
    table: "price_list",
    natural_key: &["item_name"],
    required: &[],
    columns: &[
        Column::new("item_name", &["name", "itemName"], Conversion::Text),
        Column::new("description", &["description"], Conversion::Text),
        Column::new("unit_price", &["price", "unitPrice"], Conversion::Number(0.0)),
        Column::new("unit", &["unit"], Conversion::Text),
        Column::new("category", &["category"], Conversion::Text),
        Column::new("item_data", &[], Conversion::Payload),
    ],
    blob: None,
    prepare: None,
    snapshot_column: Some("item_data"),
    restore_fields: &[],
    local: LocalTarget::KeyArray { key: "priceList" },
};

static STAFF_SIGNATURE: Descriptor = Descriptor {
    record_type: RecordType::StaffSignature,
    table: "staff_signatures",
    natural_key: &["staff_name"],
    required: &[],
    columns: &[
        Column::new("staff_name", &["staffName"], Conversion::Text),
        Column::new("signature_image", &["signatureImage"], Conversion::Json),
        Column::new("last_updated", &[], Conversion::Now),
    ],
    blob: None,
    prepare: None,
    snapshot_column: None,
    restore_fields: &[("staffName", "staff_name"), ("signatureImage", "signature_image")],
    local: LocalTarget::KeyMap {
        key: "timesheet_staff_signatures",
        key_field: "staffName",
        value_field: "signatureImage",
    },
};

static USER_PREFERENCE: Descriptor = Descriptor {
    record_type: RecordType::UserPreference,
    table: "user_preferences",
    natural_key: &["preference_key"],
    required: &[],
    columns: &[
        Column::new("preference_key", &["key"], Conversion::Text),
        Column::new("preference_value", &["value"], Conversion::Json),
        Column::new("last_updated", &[], Conversion::Now),
    ],
    blob: None,
    prepare: None,
    snapshot_column: None,
    restore_fields: &[("key", "preference_key"), ("value", "preference_value")],
    local: LocalTarget::KeyPerRow { key_field: "key", value_field: "value" },
};

static KEYWORD_ALIAS_SET: Descriptor = Descriptor {
    record_type: RecordType::KeywordAliasSet,
    table: "keyword_aliases",
    natural_key: &[],
    required: &[],
    columns: &[
        Column::new("aliases_data", &[], Conversion::Payload),
        Column::new("last_updated", &[], Conversion::Now),
    ],
    blob: None,
    prepare: None,
    snapshot_column: Some("aliases_data"),
    restore_fields: &[],
    local: LocalTarget::KeyValue { key: "keywordAliases" },
};

static GMAIL_ACCOUNT_LIST: Descriptor = Descriptor {
    record_type: RecordType::GmailAccountList,
    table: "gmail_accounts",
    natural_key: &[],
    required: &["accounts"],
    columns: &[
        Column::new("accounts", &["accounts"], Conversion::Json),
        Column::new("last_updated", &[], Conversion::Now),
    ],
    blob: None,
    prepare: Some(wrap_gmail_accounts),
    snapshot_column: Some("accounts"),
    restore_fields: &[],
    local: LocalTarget::KeyValue { key: "gmailAccounts" },
};

/// Gmail payloads are bare arrays; expose them as `accounts` after sanitizing.
fn wrap_gmail_accounts(payload: &Value) -> Value {
    let mut out = Map::new();
    out.insert("accounts".into(), sanitize_gmail_accounts(payload));
    Value::Object(out)
}

/// Look up the descriptor for a record type.
#[must_use]
pub fn descriptor(record_type: RecordType) -> &'static Descriptor {
    match record_type {
        RecordType::Project => &PROJECT,
        RecordType::CsvFile => &CSV_FILE,
        RecordType::Invoice => &INVOICE,
        RecordType::SketcherImport => &SKETCHER_IMPORT,
        RecordType::GanttProject => &GANTT_PROJECT,
        RecordType::Transaction => &TRANSACTION,
        RecordType::LabourAllocationEntry => &LABOUR_ALLOCATION,
        RecordType::Quote => &QUOTE,
        RecordType::InvoiceDocument => &INVOICE_DOCUMENT,
        RecordType::Client => &CLIENT,
        RecordType::TimesheetEntry => &TIMESHEET_ENTRY,
        RecordType::PriceListItem => &PRICE_LIST_ITEM,
        RecordType::StaffSignature => &STAFF_SIGNATURE,
        RecordType::UserPreference => &USER_PREFERENCE,
        RecordType::KeywordAliasSet => &KEYWORD_ALIAS_SET,
        RecordType::GmailAccountList => &GMAIL_ACCOUNT_LIST,
    }
}
