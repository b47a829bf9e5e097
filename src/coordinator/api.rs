// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public entry points: enqueueing, manual triggers and status access.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::detect::{detect, RawWrite};
use crate::queue::FlushReason;
use crate::record::Record;
use crate::session::SessionProvider;
use crate::status::SyncStatus;

use super::{FlushReport, SyncEngine, SyncState};

impl SyncEngine {
    /// Queue a record for backup, replacing any pending entry with the same key.
    ///
    /// Re-arms the debounce deadline; the flush happens once no new record
    /// has arrived for the configured quiet period.
    pub fn enqueue(&self, record: Record) {
        if !self.is_enabled() {
            trace!(record_type = %record.record_type, "Sync disabled, record dropped");
            return;
        }
        let record_type = record.record_type;
        let (fresh, depth, bytes) = {
            let mut queue = self.queue.lock();
            let fresh = queue.push(record);
            (fresh, queue.len(), queue.total_bytes())
        };
        debug!(%record_type, fresh, depth, "Record queued");
        crate::metrics::set_queue_depth(depth);
        crate::metrics::set_queue_bytes(bytes);
        self.arm_deadline();
    }

    /// Classify a raw local write and queue every record it yields.
    pub fn record_write(&self, write: &RawWrite) {
        let records = detect(write);
        if records.is_empty() {
            trace!(collection = %write.collection, "Write not backed up");
            return;
        }
        crate::metrics::record_detected(records[0].record_type, records.len());
        for record in records {
            self.enqueue(record);
        }
    }

    /// Schedule a scan of every local collection and key.
    ///
    /// Records already uploaded unchanged this session are skipped.
    pub fn queue_full_sync(&self) {
        if !self.is_enabled() {
            return;
        }
        let depth = {
            let mut queue = self.queue.lock();
            queue.push_full();
            queue.len()
        };
        debug!(depth, "Full sync queued");
        crate::metrics::set_queue_depth(depth);
        self.arm_deadline();
    }

    /// Flush now instead of waiting for the deadline.
    ///
    /// Returns `None` if a flush is already in flight; the pending entries
    /// are picked up by the next cycle.
    pub async fn sync_now(&self) -> Option<FlushReport> {
        self.flush(FlushReason::Manual).await
    }

    /// Time of the last flush in which no entry failed.
    #[must_use]
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.lock()
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status.snapshot()
    }

    pub fn dismiss_banner(&self) {
        self.status.dismiss_banner();
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionProvider> {
        &self.session
    }

    /// Move the deadline to `now + debounce` and wake the run loop.
    pub(super) fn arm_deadline(&self) {
        *self.deadline.lock() = Some(tokio::time::Instant::now() + self.config.debounce());
        self.wake.notify_one();
        if !self.is_syncing() {
            self.set_state(SyncState::Accumulating);
        }
    }

    /// Clear the deadline if it has passed. Returns true if it had.
    pub(super) fn take_due_deadline(&self) -> bool {
        let mut deadline = self.deadline.lock();
        match *deadline {
            Some(at) if at <= tokio::time::Instant::now() => {
                *deadline = None;
                true
            }
            _ => false,
        }
    }
}
