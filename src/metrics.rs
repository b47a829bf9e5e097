// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for backup-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `backup_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `record_type`: kebab-case type name (`transaction`, `csv-file`, ...)
//! - `outcome`: uploaded, skipped, failed
//! - `reason`: debounce, manual, periodic, shutdown

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::record::RecordType;

/// Record a finished flush cycle.
pub fn record_flush(reason: &str, duration: Duration) {
    counter!("backup_sync_flushes_total", "reason" => reason.to_string()).increment(1);
    histogram!("backup_sync_flush_seconds").record(duration.as_secs_f64());
}

/// Record the outcome of one queue entry.
pub fn record_entry(record_type: RecordType, outcome: &str) {
    counter!(
        "backup_sync_entries_total",
        "record_type" => record_type.as_str(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a failed upload attempt (before retry).
pub fn record_upload_error(record_type: RecordType, error_type: &str) {
    counter!(
        "backup_sync_upload_errors_total",
        "record_type" => record_type.as_str(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record a blob transfer.
pub fn record_blob_bytes(direction: &str, bytes: usize) {
    counter!("backup_sync_blob_bytes_total", "direction" => direction.to_string()).increment(bytes as u64);
}

/// Record rows written back locally during restore.
pub fn record_restored(record_type: RecordType, rows: usize) {
    counter!(
        "backup_sync_restored_rows_total",
        "record_type" => record_type.as_str()
    )
    .increment(rows as u64);
}

/// Record a record type that could not be restored.
pub fn record_restore_failure(record_type: RecordType) {
    counter!(
        "backup_sync_restore_failures_total",
        "record_type" => record_type.as_str()
    )
    .increment(1);
}

/// Record a cache-clear check and its verdict.
pub fn record_restore_check(verdict: &str) {
    counter!("backup_sync_restore_checks_total", "verdict" => verdict.to_string()).increment(1);
}

/// Set pending queue entries.
pub fn set_queue_depth(entries: usize) {
    gauge!("backup_sync_queue_entries").set(entries as f64);
}

/// Set pending queue payload bytes.
pub fn set_queue_bytes(bytes: usize) {
    gauge!("backup_sync_queue_bytes").set(bytes as f64);
}

/// Set engine state gauge (for dashboards).
pub fn set_engine_state(state: &str) {
    gauge!("backup_sync_state", "state" => state.to_string()).set(1.0);
}

/// Record session establishment.
pub fn record_session(outcome: &str) {
    counter!("backup_sync_sessions_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a write classified by the change detector.
pub fn record_detected(record_type: RecordType, count: usize) {
    counter!(
        "backup_sync_detected_records_total",
        "record_type" => record_type.as_str()
    )
    .increment(count as u64);
}

/// Record a stale-backup warning from the health check.
pub fn record_stale_warning() {
    counter!("backup_sync_stale_warnings_total").increment(1);
}

/// Helper for timing an operation.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    #[must_use]
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these are no-ops; they must not panic.
    #[test]
    fn test_recorders_are_safe_without_exporter() {
        record_flush("debounce", Duration::from_millis(5));
        record_entry(RecordType::Transaction, "uploaded");
        record_upload_error(RecordType::Invoice, "network");
        record_blob_bytes("up", 128);
        record_restored(RecordType::Project, 3);
        record_restore_failure(RecordType::CsvFile);
        record_restore_check("needed");
        set_queue_depth(2);
        set_queue_bytes(512);
        set_engine_state("idle");
        record_session("ok");
        record_detected(RecordType::Quote, 4);
        record_stale_warning();
    }

    #[test]
    fn test_latency_timer() {
        let timer = LatencyTimer::new();
        assert!(timer.elapsed() < Duration::from_secs(5));
    }
}
