// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the sync engine coordinator.

use crate::record::RecordType;

/// Debouncer state.
///
/// Use [`super::SyncEngine::state()`] to check the current state or
/// [`super::SyncEngine::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing pending
    Idle,
    /// Entries queued, waiting for the quiet period to elapse
    Accumulating,
    /// A flush is in progress
    Flushing,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Accumulating => write!(f, "Accumulating"),
            Self::Flushing => write!(f, "Flushing"),
        }
    }
}

/// What happened to one queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    /// Failed validation; dropped with a warning
    Skipped,
    /// Still failing after every retry; abandoned for this cycle
    Failed,
}

impl UploadOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Result of a flush cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records processed (a full-sync marker counts the records it expanded to)
    pub total: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Failures that looked like credential problems
    pub auth_errors: usize,
    /// Failures that looked like connectivity problems
    pub network_errors: usize,
}

impl FlushReport {
    /// Check if no entry failed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub(super) fn tally(&mut self, outcome: UploadOutcome) {
        self.total += 1;
        match outcome {
            UploadOutcome::Uploaded => self.uploaded += 1,
            UploadOutcome::Skipped => self.skipped += 1,
            UploadOutcome::Failed => self.failed += 1,
        }
    }
}

/// A record type whose restore did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialRestoreFailure {
    pub record_type: RecordType,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Local records written, per type (types with no remote rows are omitted)
    pub restored: Vec<(RecordType, usize)>,
    /// Rows skipped because their blob could not be downloaded
    pub skipped_rows: usize,
    /// Types whose local home already held data and was left untouched
    pub kept_local: Vec<RecordType>,
    pub failures: Vec<PartialRestoreFailure>,
}

impl RestoreReport {
    #[must_use]
    pub fn total_restored(&self) -> usize {
        self.restored.iter().map(|(_, n)| n).sum()
    }

    #[must_use]
    pub fn restored_for(&self, record_type: RecordType) -> usize {
        self.restored
            .iter()
            .find(|(t, _)| *t == record_type)
            .map_or(0, |(_, n)| *n)
    }
}

/// Verdict of a cache-clear check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Local data present, or nothing to restore remotely
    NotNeeded,
    Complete(RestoreReport),
    /// Some types failed; never reported as complete
    Partial(RestoreReport),
}

impl RestoreOutcome {
    #[must_use]
    pub fn report(&self) -> Option<&RestoreReport> {
        match self {
            Self::NotNeeded => None,
            Self::Complete(report) | Self::Partial(report) => Some(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_state_display() {
        assert_eq!(format!("{}", SyncState::Idle), "Idle");
        assert_eq!(format!("{}", SyncState::Flushing), "Flushing");
    }

    #[test]
    fn test_flush_report_tally() {
        let mut report = FlushReport::default();
        report.tally(UploadOutcome::Uploaded);
        report.tally(UploadOutcome::Skipped);
        assert!(report.is_success());
        report.tally(UploadOutcome::Failed);
        assert!(!report.is_success());
        assert_eq!((report.total, report.uploaded, report.skipped, report.failed), (3, 1, 1, 1));
    }

    #[test]
    fn test_restore_report_totals() {
        let report = RestoreReport {
            restored: vec![(RecordType::Project, 3), (RecordType::Transaction, 2)],
            skipped_rows: 0,
            kept_local: Vec::new(),
            failures: Vec::new(),
        };
        assert_eq!(report.total_restored(), 5);
        assert_eq!(report.restored_for(RecordType::Project), 3);
        assert_eq!(report.restored_for(RecordType::Quote), 0);
        assert!(RestoreOutcome::Complete(report).report().is_some());
        assert!(RestoreOutcome::NotNeeded.report().is_none());
    }
}
