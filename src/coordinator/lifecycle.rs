// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine lifecycle: start, run loop, shutdown.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::SyncError;
use crate::queue::FlushReason;
use crate::status::Indicator;

use super::{RestoreOutcome, SyncEngine, SyncState};

impl SyncEngine {
    /// Establish the session and run the automatic cache-clear check.
    ///
    /// A session failure disables sync for the process and is surfaced on
    /// the status board; the host keeps working without backups.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<Option<RestoreOutcome>, SyncError> {
        if !self.config.enabled {
            info!("Backup sync disabled in config");
            self.status.disabled("disabled in settings");
            return Ok(None);
        }

        if let Err(e) = self.session.ensure_session().await {
            error!(error = %e, "No backup session, sync disabled");
            crate::metrics::record_session("failed");
            self.enabled.store(false, Ordering::Release);
            self.status.disabled(&e.to_string());
            return Err(e);
        }
        crate::metrics::record_session("ok");
        self.status.set_indicator(Indicator::Ready);
        info!("Backup sync ready");

        if !self.config.auto_restore || self.restore_checked.swap(true, Ordering::AcqRel) {
            return Ok(None);
        }
        self.check_and_restore().await.map(Some)
    }

    /// Drive the engine until [`shutdown()`](Self::shutdown).
    ///
    /// Drains observed writes into the queue, fires the debounce deadline,
    /// runs the periodic full sync while idle and the backup health check.
    /// A zero interval turns the matching periodic task off.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let mut writes = self.writes_rx.lock().await;
        let _running = RunningGuard::enter(&self.running);
        if *shutdown.borrow_and_update() {
            debug!("Shutdown already requested, not starting");
            return;
        }

        let mut full_sync = periodic(self.config.full_sync_interval_secs);
        let mut health = periodic(self.config.health_check_interval_secs);
        let stale_after = chrono::Duration::seconds(self.config.stale_after_secs as i64);

        info!("Backup sync running");
        loop {
            let deadline = *self.deadline.lock();
            tokio::select! {
                _ = shutdown.changed() => break,

                Some(write) = writes.recv() => {
                    self.record_write(&write);
                }

                // Deadline moved; re-read it
                _ = self.wake.notified() => {}

                _ = sleep_until(deadline) => {
                    if self.take_due_deadline() {
                        self.flush(FlushReason::Debounce).await;
                    }
                }

                _ = tick(&mut full_sync) => {
                    if self.is_enabled() && self.state() == SyncState::Idle && self.pending() == 0 {
                        debug!("Periodic full sync");
                        self.queue_full_sync();
                        self.flush(FlushReason::Periodic).await;
                    }
                }

                _ = tick(&mut health) => {
                    if self.is_enabled() && self.status.check_stale(self.clock.now(), stale_after) {
                        crate::metrics::record_stale_warning();
                    }
                }
            }
        }
        info!("Backup sync loop stopped");
    }

    /// Stop the run loop and flush whatever is still queued.
    ///
    /// Waits for a running loop to finish its current step, then drains
    /// writes it had not received yet.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        info!("Backup sync shutting down");
        self.shutdown.send_replace(true);

        let mut running = self.running.subscribe();
        let _ = running.wait_for(|running| !*running).await;

        {
            let mut writes = self.writes_rx.lock().await;
            while let Ok(write) = writes.try_recv() {
                self.record_write(&write);
            }
        }

        if self.pending() > 0 {
            if let Some(report) = self.flush(FlushReason::Shutdown).await {
                info!(uploaded = report.uploaded, failed = report.failed, "Final flush done");
            }
        }
        *self.deadline.lock() = None;
        self.set_state(SyncState::Idle);
    }
}

/// Marks the run loop live until dropped, including when its task is aborted.
struct RunningGuard<'a>(&'a watch::Sender<bool>);

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

fn periodic(secs: u64) -> Option<Interval> {
    if secs == 0 {
        return None;
    }
    let period = Duration::from_secs(secs);
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::SyncConfig;
    use crate::record::{Record, RecordType};
    use crate::session::{SessionPolicy, SessionProvider};
    use crate::status::Indicator;
    use crate::storage::memory::{MemoryBackend, MemoryDocumentStore, MemoryKeyValueStore};
    use crate::storage::traits::KeyValueStore;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_start_without_client_disables_sync() {
        let key_values = Arc::new(MemoryKeyValueStore::new());
        let (_publisher, session) = SessionProvider::channel(
            SessionPolicy::anonymous("test.local"),
            key_values.clone(),
            Arc::new(crate::clock::SystemClock),
            Duration::from_millis(10),
        );
        let engine = SyncEngine::new(
            SyncConfig {
                client_ready_timeout_ms: 10,
                ..SyncConfig::default()
            },
            Arc::new(session),
            Arc::new(MemoryDocumentStore::new()),
            key_values,
            Arc::new(MemoryBackend::new()),
        );

        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, SyncError::AuthUnavailable));
        assert!(!engine.is_enabled());
        let status = engine.status();
        assert_eq!(status.indicator, Indicator::Disabled);
        assert!(status.banner.is_some());

        engine.enqueue(Record::new(RecordType::Quote, json!({"quoteNumber": "Q-1"})));
        assert_eq!(engine.pending(), 0);
    }

    #[tokio::test]
    async fn test_auto_restore_runs_once() {
        let h = harness(SyncConfig::default());
        assert_eq!(h.engine.start().await.unwrap(), Some(RestoreOutcome::NotNeeded));
        assert_eq!(h.engine.start().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_flushes_after_quiet_period() {
        let h = harness(fast_config());
        let engine = Arc::clone(&h.engine);
        let handle = tokio::spawn(async move { engine.run().await });

        let kv = h.engine.observed_key_value_store();
        kv.set_item("quotes", r#"[{"quoteNumber":"Q-1","total":"10"}]"#)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(h.backend.upsert_count(), 0);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.backend.upsert_count(), 1);
        assert_eq!(h.engine.state(), SyncState::Idle);

        h.engine.shutdown().await;
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending() {
        let h = harness(fast_config());
        h.engine.enqueue(Record::new(RecordType::Quote, json!({"quoteNumber": "Q-9"})));
        h.engine.shutdown().await;
        assert_eq!(h.backend.rows("quotes").len(), 1);
        assert_eq!(h.engine.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_intervals_disable_periodic_tasks() {
        let h = harness(SyncConfig {
            full_sync_interval_secs: 0,
            health_check_interval_secs: 0,
            ..fast_config()
        });
        let engine = Arc::clone(&h.engine);
        let handle = tokio::spawn(async move { engine.run().await });

        let kv = h.engine.observed_key_value_store();
        kv.set_item("quotes", r#"[{"quoteNumber":"Q-2"}]"#).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(h.backend.rows("quotes").len(), 1);

        // Nothing periodic fires on its own
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(h.backend.upsert_count(), 1);

        h.engine.shutdown().await;
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_writes_the_loop_has_not_seen() {
        let h = harness(fast_config());
        let engine = Arc::clone(&h.engine);
        let handle = tokio::spawn(async move { engine.run().await });
        tokio::task::yield_now().await;

        let kv = h.engine.observed_key_value_store();
        kv.set_item("quotes", r#"[{"quoteNumber":"Q-1"}]"#).await.unwrap();
        h.engine.shutdown().await;
        handle.await.unwrap();

        assert_eq!(h.backend.rows("quotes").len(), 1);
        assert_eq!(h.engine.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_run_starts() {
        let h = harness(fast_config());
        h.engine.shutdown().await;
        let engine = Arc::clone(&h.engine);
        tokio::spawn(async move { engine.run().await }).await.unwrap();
        assert_eq!(h.engine.state(), SyncState::Idle);
    }
}
