// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache-clear detection and restore.
//!
//! Local data counts as cleared when the primary database is missing or both
//! primary collections are empty. If the backend then holds projects for the
//! current identity, every record type is pulled back, best effort, in
//! [`RecordType::ALL`] order. A local home that already holds data (a
//! non-empty collection or key) is never overwritten.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::descriptor::{descriptor, Descriptor, LocalTarget, BUDGET_DB, PRIMARY_COLLECTIONS, PRIMARY_TABLE};
use crate::error::SyncError;
use crate::normalize::as_text;
use crate::record::RecordType;
use crate::storage::traits::Identity;

use super::{PartialRestoreFailure, RestoreOutcome, RestoreReport, SyncEngine};

impl SyncEngine {
    /// Check for cleared local storage and restore from the backend if so.
    ///
    /// Holds the storage lock for the whole run, so flushes wait.
    #[tracing::instrument(skip(self))]
    pub async fn check_and_restore(&self) -> Result<RestoreOutcome, SyncError> {
        let identity = self.session.ensure_session().await?;
        let _storage = self.storage_lock.lock().await;

        if !self.needs_restore(&identity).await? {
            crate::metrics::record_restore_check("not_needed");
            debug!("Local data present or nothing to restore");
            return Ok(RestoreOutcome::NotNeeded);
        }
        crate::metrics::record_restore_check("needed");
        info!("Local storage looks cleared, restoring from backup");

        let report = self.restore_all(&identity).await;
        self.status
            .restore_finished(report.total_restored(), report.failures.len());
        info!(
            restored = report.total_restored(),
            skipped_rows = report.skipped_rows,
            failed_types = report.failures.len(),
            "Restore finished"
        );

        if report.failures.is_empty() {
            Ok(RestoreOutcome::Complete(report))
        } else {
            Ok(RestoreOutcome::Partial(report))
        }
    }

    async fn needs_restore(&self, identity: &Identity) -> Result<bool, SyncError> {
        let (name, version) = BUDGET_DB;
        if let Some(db) = self.local.open_store(name, version).await {
            for collection in PRIMARY_COLLECTIONS {
                if self.local.collection_has_rows(&db, collection).await {
                    return Ok(false);
                }
            }
        }
        let remote = self.backend.count(identity, PRIMARY_TABLE).await?;
        debug!(remote, "Remote primary rows");
        Ok(remote > 0)
    }

    async fn restore_all(&self, identity: &Identity) -> RestoreReport {
        let mut report = RestoreReport::default();
        for record_type in RecordType::ALL {
            match self.restore_type(identity, descriptor(record_type)).await {
                Ok(restored) => {
                    report.skipped_rows += restored.skipped;
                    if restored.kept > 0 {
                        report.kept_local.push(record_type);
                    }
                    if restored.written > 0 {
                        debug!(%record_type, written = restored.written, skipped = restored.skipped, "Type restored");
                        crate::metrics::record_restored(record_type, restored.written);
                        report.restored.push((record_type, restored.written));
                    }
                }
                Err(e) => {
                    warn!(%record_type, error = %e, "Type restore failed, continuing");
                    crate::metrics::record_restore_failure(record_type);
                    report.failures.push(PartialRestoreFailure {
                        record_type,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Pull one type back into its local home.
    async fn restore_type(&self, identity: &Identity, desc: &Descriptor) -> Result<TypeRestore, SyncError> {
        let rows = self.backend.select_all(identity, desc.table).await?;
        if rows.is_empty() {
            return Ok(TypeRestore::default());
        }

        let mut locals = Vec::with_capacity(rows.len());
        let mut skipped = 0;
        for row in &rows {
            let blob = match desc.blob {
                Some(spec) => {
                    let Some(path) = row.get(spec.path_column).and_then(as_text) else {
                        skipped += 1;
                        continue;
                    };
                    match self.backend.download_blob(identity, spec.bucket, &path).await {
                        Ok(bytes) => {
                            crate::metrics::record_blob_bytes("down", bytes.len());
                            Some(bytes)
                        }
                        Err(e) => {
                            warn!(record_type = %desc.record_type, %path, error = %e, "Blob download failed, row skipped");
                            skipped += 1;
                            continue;
                        }
                    }
                }
                None => None,
            };
            locals.push(desc.to_local(row, blob.as_deref()));
        }

        let (written, kept) = self.write_local(desc.local, locals).await?;
        if kept > 0 {
            info!(record_type = %desc.record_type, kept, "Local data present, remote rows not restored");
        }
        Ok(TypeRestore { written, skipped, kept })
    }

    /// Write restored rows home. Returns `(written, kept)`, where `kept`
    /// counts rows withheld because local data was already there.
    async fn write_local(&self, target: LocalTarget, locals: Vec<Value>) -> Result<(usize, usize), SyncError> {
        let count = locals.len();
        match target {
            LocalTarget::Document { db: (name, version), collection } => {
                let db = self
                    .local
                    .open_store(name, version)
                    .await
                    .ok_or_else(|| SyncError::StoreUnavailable(format!("{name} v{version}")))?;
                if self.local.collection_has_rows(&db, collection).await {
                    return Ok((0, count));
                }
                for value in &locals {
                    self.local.write_record(&db, collection, value).await?;
                }
            }
            LocalTarget::KeyArray { key } => {
                if self.key_holds_data(key).await {
                    return Ok((0, count));
                }
                self.local.set_item(key, &Value::Array(locals).to_string()).await?;
            }
            LocalTarget::KeyMap { key, key_field, value_field } => {
                if self.key_holds_data(key).await {
                    return Ok((0, count));
                }
                let mut map = Map::new();
                for local in &locals {
                    if let Some(name) = local.get(key_field).and_then(as_text) {
                        map.insert(name, local.get(value_field).cloned().unwrap_or(Value::Null));
                    }
                }
                self.local.set_item(key, &Value::Object(map).to_string()).await?;
            }
            LocalTarget::KeyPerRow { key_field, value_field } => {
                let (mut written, mut kept) = (0, 0);
                for local in &locals {
                    let Some(key) = local.get(key_field).and_then(as_text) else {
                        continue;
                    };
                    if self.key_holds_data(&key).await {
                        kept += 1;
                        continue;
                    }
                    let value = local.get(value_field).cloned().unwrap_or(Value::Null);
                    self.local.set_item(&key, &value.to_string()).await?;
                    written += 1;
                }
                return Ok((written, kept));
            }
            LocalTarget::KeyValue { key } => {
                if self.key_holds_data(key).await {
                    return Ok((0, count));
                }
                // One row per owner; the newest write wins if several slipped in
                if let Some(value) = locals.last() {
                    self.local.set_item(key, &value.to_string()).await?;
                }
            }
        }
        Ok((count, 0))
    }

    /// Whether a key already holds something worth keeping.
    async fn key_holds_data(&self, key: &str) -> bool {
        let Some(raw) = self.local.get_item(key).await else {
            return false;
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Null) => false,
            Ok(Value::Array(items)) => !items.is_empty(),
            Ok(Value::Object(map)) => !map.is_empty(),
            Ok(Value::String(text)) => !text.is_empty(),
            Ok(_) => true,
            Err(_) => !raw.trim().is_empty(),
        }
    }
}

#[derive(Debug, Default)]
struct TypeRestore {
    written: usize,
    skipped: usize,
    kept: usize,
}
