// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Flush cycle: snapshot the queue, upload every entry, report.
//!
//! Entries are uploaded one at a time. Each gets the configured number of
//! attempts; a failure is logged, counted and abandoned for this cycle so
//! the rest of the batch still goes through.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::descriptor::{content_hash, descriptor, BUDGET_DB, OWNER_COLUMN, SKETCHER_DB};
use crate::detect::{detect, RawWrite};
use crate::error::SyncError;
use crate::metrics::LatencyTimer;
use crate::normalize::as_text;
use crate::queue::{FlushReason, QueueEntry, SyncQueue};
use crate::record::Record;
use crate::resilience::retry::retry;
use crate::status::Indicator;
use crate::storage::traits::Identity;

use super::{FlushGuard, FlushReport, SyncEngine, SyncState, UploadOutcome};

impl SyncEngine {
    /// Run one flush cycle.
    ///
    /// Returns `None` when another flush is already running.
    #[tracing::instrument(skip(self))]
    pub(super) async fn flush(&self, reason: FlushReason) -> Option<FlushReport> {
        let Some(_guard) = FlushGuard::acquire(&self.flushing) else {
            debug!("Flush already in flight");
            return None;
        };
        *self.deadline.lock() = None;
        let _storage = self.storage_lock.lock().await;

        let entries = self.queue.lock().take();
        crate::metrics::set_queue_depth(0);
        crate::metrics::set_queue_bytes(0);
        if entries.is_empty() {
            self.settle();
            return Some(FlushReport::default());
        }

        let timer = LatencyTimer::new();
        self.set_state(SyncState::Flushing);
        self.status.set_indicator(Indicator::Syncing);

        let report = match self.session.ensure_session().await {
            Ok(identity) => {
                let records = self.expand(entries).await;
                self.upload_all(&identity, records).await
            }
            Err(e) => {
                warn!(error = %e, "No session, flush abandoned");
                crate::metrics::record_session("failed");
                let total = entries.len();
                FlushReport {
                    total,
                    failed: total,
                    auth_errors: total,
                    ..FlushReport::default()
                }
            }
        };

        if report.is_success() {
            let now = self.clock.now();
            *self.last_sync.lock() = Some(now);
            self.status
                .flush_succeeded(now, report.uploaded, self.config.show_notifications);
        } else {
            self.status
                .flush_failed(report.failed, report.auth_errors, report.network_errors);
        }

        crate::metrics::record_flush(&format!("{reason:?}").to_lowercase(), timer.elapsed());
        info!(
            total = report.total,
            uploaded = report.uploaded,
            skipped = report.skipped,
            failed = report.failed,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "Flush complete"
        );

        self.settle();
        Some(report)
    }

    /// Pick the post-flush state; entries queued mid-flush get a fresh deadline.
    fn settle(&self) {
        if self.queue.lock().is_empty() {
            self.set_state(SyncState::Idle);
        } else {
            *self.deadline.lock() = Some(tokio::time::Instant::now() + self.config.debounce());
            self.wake.notify_one();
            self.set_state(SyncState::Accumulating);
        }
    }

    /// Replace a full-sync marker with the local records not yet uploaded
    /// unchanged this session.
    async fn expand(&self, entries: Vec<QueueEntry>) -> Vec<Record> {
        let full = entries.iter().any(|e| matches!(e, QueueEntry::FullSync));
        let mut merged = SyncQueue::new();
        for entry in entries {
            if let QueueEntry::Record(record) = entry {
                merged.push(record);
            }
        }
        if full {
            let scanned = self.scan_local().await;
            let found = scanned.len();
            let mut changed = 0;
            for record in scanned {
                if !self.already_uploaded(&record) {
                    changed += 1;
                    merged.push(record);
                }
            }
            info!(found, changed, "Full sync scan complete");
        }
        merged
            .take()
            .into_iter()
            .filter_map(|entry| match entry {
                QueueEntry::Record(record) => Some(record),
                QueueEntry::FullSync => None,
            })
            .collect()
    }

    /// Every record the local stores currently hold.
    async fn scan_local(&self) -> Vec<Record> {
        let mut records = Vec::new();
        for (name, version) in [BUDGET_DB, SKETCHER_DB] {
            let Some(db) = self.local.open_store(name, version).await else {
                continue;
            };
            for collection in self.local.collections(&db).await {
                for value in self.local.read_all(&db, &collection).await {
                    records.extend(detect(&RawWrite::document(collection.clone(), value)));
                }
            }
        }
        for key in self.local.keys().await {
            if let Some(raw) = self.local.get_item(&key).await {
                records.extend(detect(&RawWrite::key_value(key, raw)));
            }
        }
        records
    }

    fn memo_key(record: &Record) -> (crate::record::RecordType, String) {
        (record.record_type, descriptor(record.record_type).dedup_key(record))
    }

    fn already_uploaded(&self, record: &Record) -> bool {
        self.memo
            .get(&Self::memo_key(record))
            .is_some_and(|hash| *hash == content_hash(&record.payload))
    }

    async fn upload_all(&self, identity: &Identity, records: Vec<Record>) -> FlushReport {
        let mut report = FlushReport::default();
        for record in records {
            let outcome = match self.upload(identity, &record).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let auth = e.is_auth();
                    let network = e.is_network();
                    warn!(
                        record_type = %record.record_type,
                        error = %e,
                        auth,
                        network,
                        "Upload failed after retries"
                    );
                    if auth {
                        report.auth_errors += 1;
                        self.session.invalidate();
                    } else if network {
                        report.network_errors += 1;
                    }
                    UploadOutcome::Failed
                }
            };
            if outcome == UploadOutcome::Uploaded {
                self.memo
                    .insert(Self::memo_key(&record), content_hash(&record.payload));
            }
            crate::metrics::record_entry(record.record_type, outcome.as_str());
            report.tally(outcome);
        }
        report
    }

    /// Upload one record: blob first (if the type has one), then metadata.
    ///
    /// Validation problems are `Ok(Skipped)`; only transport or auth
    /// failures that survive every retry are errors.
    pub(super) async fn upload(&self, identity: &Identity, record: &Record) -> Result<UploadOutcome, SyncError> {
        let desc = descriptor(record.record_type);

        let mut row = match desc.build_row(record, self.clock.now()) {
            Ok(row) => row,
            Err(SyncError::Validation { record_type, field }) => {
                warn!(%record_type, field, "Record missing a required field, skipped");
                return Ok(UploadOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };
        row.insert(OWNER_COLUMN.to_string(), Value::String(identity.user_id.clone()));

        let blob = match desc.blob {
            Some(spec) => {
                let Some(bytes) = spec.encode(&record.payload) else {
                    warn!(record_type = %record.record_type, field = spec.field, "Blob content missing, skipped");
                    return Ok(UploadOutcome::Skipped);
                };
                let Some(name) = row.get(spec.name_column).and_then(as_text) else {
                    return Ok(UploadOutcome::Skipped);
                };
                let path = format!("{}/{}", identity.user_id, name);
                row.insert(spec.path_column.to_string(), Value::String(path.clone()));
                if let Some(column) = spec.size_column {
                    row.insert(column.to_string(), Value::from(bytes.len()));
                }
                Some((spec, path, bytes))
            }
            None => None,
        };

        let conflict = desc.conflict_target();
        let name = format!("upload_{}", record.record_type);
        retry(&name, &self.config.upload_retry(), || async {
            if let Some((spec, path, bytes)) = &blob {
                self.backend
                    .upload_blob(identity, spec.bucket, path, bytes.clone(), spec.content_type)
                    .await
                    .inspect_err(|e| crate::metrics::record_upload_error(record.record_type, error_kind(e)))?;
                crate::metrics::record_blob_bytes("up", bytes.len());
            }
            self.backend
                .upsert(identity, desc.table, &row, &conflict)
                .await
                .inspect_err(|e| crate::metrics::record_upload_error(record.record_type, error_kind(e)))?;
            Ok::<_, SyncError>(())
        })
        .await?;

        if self.config.verbose {
            info!(record_type = %record.record_type, table = desc.table, "Uploaded");
        } else {
            debug!(record_type = %record.record_type, table = desc.table, "Uploaded");
        }
        Ok(UploadOutcome::Uploaded)
    }
}

fn error_kind(e: &SyncError) -> &'static str {
    if e.is_auth() {
        "auth"
    } else if e.is_network() {
        "network"
    } else {
        "other"
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::record::RecordType;
    use crate::storage::memory::BackendCall;
    use crate::storage::traits::KeyValueStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_empty_flush_reports_nothing() {
        let h = harness(fast_config());
        let report = h.engine.sync_now().await.unwrap();
        assert_eq!(report, FlushReport::default());
        assert_eq!(h.engine.state(), SyncState::Idle);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_row_shape() {
        let h = harness(fast_config());
        h.engine.enqueue(Record::new(
            RecordType::Transaction,
            json!({"date": "05/01/2024", "description": "Paint", "spent": "£42.50"}),
        ));
        let report = h.engine.sync_now().await.unwrap();
        assert_eq!(report.uploaded, 1);

        let rows = h.backend.rows("transactions");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["date"], json!("2024-01-05"));
        assert_eq!(rows[0]["amount"].as_f64(), Some(-42.5));
        assert_eq!(
            h.backend.calls(),
            vec![BackendCall::Upsert {
                table: "transactions".into(),
                conflict: vec!["user_id".into(), "date".into(), "description".into(), "amount".into()],
            }]
        );
        assert!(h.engine.last_sync_time().is_some());
    }

    #[tokio::test]
    async fn test_validation_failure_is_skipped() {
        let h = harness(fast_config());
        h.engine
            .enqueue(Record::new(RecordType::Quote, json!({"clientName": "Acme"})));
        let report = h.engine.sync_now().await.unwrap();
        assert_eq!((report.skipped, report.failed), (1, 0));
        assert!(report.is_success());
        assert_eq!(h.backend.upsert_count(), 0);
    }

    #[tokio::test]
    async fn test_csv_blob_uploaded_before_metadata() {
        let h = harness(fast_config());
        h.engine.enqueue(Record::new(
            RecordType::CsvFile,
            json!({"fileName": "budget.csv", "data": "a,b\n1,2"}),
        ));
        h.engine.sync_now().await.unwrap();

        let calls = h.backend.calls();
        assert!(matches!(calls[0], BackendCall::UploadBlob { ref bucket, .. } if bucket == "csv-files"));
        assert!(matches!(calls[1], BackendCall::Upsert { ref table, .. } if table == "csv_files"));

        let row = &h.backend.rows("csv_files")[0];
        let path = row["file_path"].as_str().unwrap();
        assert!(path.ends_with("/budget.csv"));
        assert_eq!(h.backend.blob("csv-files", path).unwrap(), b"a,b\n1,2".to_vec());
    }

    #[tokio::test]
    async fn test_full_sync_skips_unchanged_records() {
        let h = harness(fast_config());
        h.key_values
            .set_item("quotes", r#"[{"quoteNumber":"Q-1","total":"£10"}]"#)
            .await
            .unwrap();

        h.engine.queue_full_sync();
        let first = h.engine.sync_now().await.unwrap();
        assert_eq!(first.uploaded, 1);

        h.engine.queue_full_sync();
        let second = h.engine.sync_now().await.unwrap();
        assert_eq!(second.total, 0);

        h.key_values
            .set_item("quotes", r#"[{"quoteNumber":"Q-1","total":"£12"}]"#)
            .await
            .unwrap();
        h.engine.queue_full_sync();
        let third = h.engine.sync_now().await.unwrap();
        assert_eq!(third.uploaded, 1);
        assert_eq!(h.backend.rows("quotes").len(), 1);
    }
}
