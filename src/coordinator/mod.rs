// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync engine coordinator.
//!
//! The [`SyncEngine`] ties the components together:
//! - observed local stores feed the change detector
//! - detected records land in a debounced, key-deduplicated queue
//! - flushes upload each entry through its type descriptor
//! - a cache-clear check restores everything from the backend
//!
//! # States
//!
//! ```text
//! Idle → Accumulating → Flushing → Idle
//!              ↑____________|  (entries arrived mid-flush)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use backup_sync::{SyncConfig, SyncEngine, SyncState};
//! use backup_sync::clock::SystemClock;
//! use backup_sync::session::{SessionPolicy, SessionProvider};
//! use backup_sync::storage::memory::{MemoryAuth, MemoryBackend, MemoryDocumentStore, MemoryKeyValueStore};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let documents = Arc::new(MemoryDocumentStore::new());
//! let key_values = Arc::new(MemoryKeyValueStore::new());
//! let session = SessionProvider::ready(
//!     Arc::new(MemoryAuth::new()),
//!     SessionPolicy::anonymous("example.org"),
//!     key_values.clone(),
//!     Arc::new(SystemClock),
//! );
//! let engine = SyncEngine::new(
//!     SyncConfig::default(),
//!     Arc::new(session),
//!     documents,
//!     key_values,
//!     Arc::new(MemoryBackend::new()),
//! );
//! assert_eq!(engine.state(), SyncState::Idle);
//! # }
//! ```

mod types;
mod api;
mod flush;
mod lifecycle;
mod restore;

pub use types::{FlushReport, PartialRestoreFailure, RestoreOutcome, RestoreReport, SyncState, UploadOutcome};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, Notify};

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::detect::RawWrite;
use crate::queue::SyncQueue;
use crate::record::RecordType;
use crate::session::SessionProvider;
use crate::status::StatusBoard;
use crate::storage::local::LocalStoreAccessor;
use crate::storage::observed::{ObservedDocumentStore, ObservedKeyValueStore};
use crate::storage::traits::{DocumentStore, KeyValueStore, RemoteBackend};

/// Main backup coordinator.
///
/// The host hands its local stores to the engine and uses the observed
/// wrappers from [`observed_document_store()`](Self::observed_document_store)
/// and [`observed_key_value_store()`](Self::observed_key_value_store) for its
/// own writes, so every persisted change reaches the queue. Restore writes go
/// through the raw stores and are never echoed back.
///
/// # Thread Safety
///
/// The engine is `Send + Sync`; share it behind an `Arc` and drive
/// [`run()`](Self::run) on one task.
pub struct SyncEngine {
    pub(super) config: SyncConfig,

    /// Wall clock for record timestamps and staleness checks
    pub(super) clock: Arc<dyn Clock>,

    pub(super) session: Arc<SessionProvider>,

    /// Bounded access to the raw (unobserved) local stores
    pub(super) local: LocalStoreAccessor,

    pub(super) documents: Arc<dyn DocumentStore>,
    pub(super) key_values: Arc<dyn KeyValueStore>,

    pub(super) backend: Arc<dyn RemoteBackend>,

    /// Pending entries, deduplicated by record key
    pub(super) queue: parking_lot::Mutex<SyncQueue>,

    /// Debounce deadline; `None` when nothing is scheduled
    pub(super) deadline: parking_lot::Mutex<Option<tokio::time::Instant>>,

    /// Wakes the run loop when the deadline moves
    pub(super) wake: Notify,

    /// Set while a flush is in progress
    pub(super) flushing: AtomicBool,

    /// Flush and restore are mutually exclusive
    pub(super) storage_lock: tokio::sync::Mutex<()>,

    /// Content hash of everything uploaded this session, by record key
    pub(super) memo: DashMap<(RecordType, String), String>,

    /// The automatic cache-clear check runs once per process
    pub(super) restore_checked: AtomicBool,

    /// Cleared when sync is disabled in config or the session fails at start
    pub(super) enabled: AtomicBool,

    pub(super) state: watch::Sender<SyncState>,

    pub(super) status: StatusBoard,

    pub(super) last_sync: parking_lot::Mutex<Option<DateTime<Utc>>>,

    pub(super) writes_tx: UnboundedSender<RawWrite>,
    pub(super) writes_rx: tokio::sync::Mutex<UnboundedReceiver<RawWrite>>,

    pub(super) shutdown: watch::Sender<bool>,
    /// True while [`run()`](Self::run) holds the write receiver
    pub(super) running: watch::Sender<bool>,
}

impl SyncEngine {
    /// Create a new engine.
    ///
    /// The engine starts `Idle`. Call [`start()`](Self::start) to establish
    /// the session and run the automatic restore check. The session's client
    /// wait is bounded by `config.client_ready_timeout_ms`.
    pub fn new(
        config: SyncConfig,
        session: Arc<SessionProvider>,
        documents: Arc<dyn DocumentStore>,
        key_values: Arc<dyn KeyValueStore>,
        backend: Arc<dyn RemoteBackend>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Idle);
        let (shutdown_tx, _) = watch::channel(false);
        let (running_tx, _) = watch::channel(false);
        let (writes_tx, writes_rx) = mpsc::unbounded_channel();
        let local = LocalStoreAccessor::new(
            Arc::clone(&documents),
            Arc::clone(&key_values),
            config.store_open_timeout(),
        );
        session.set_ready_timeout(config.client_ready_timeout());

        Self {
            enabled: AtomicBool::new(config.enabled),
            config,
            clock: Arc::new(SystemClock),
            session,
            local,
            documents,
            key_values,
            backend,
            queue: parking_lot::Mutex::new(SyncQueue::new()),
            deadline: parking_lot::Mutex::new(None),
            wake: Notify::new(),
            flushing: AtomicBool::new(false),
            storage_lock: tokio::sync::Mutex::new(()),
            memo: DashMap::new(),
            restore_checked: AtomicBool::new(false),
            state: state_tx,
            status: StatusBoard::new(),
            last_sync: parking_lot::Mutex::new(None),
            writes_tx,
            writes_rx: tokio::sync::Mutex::new(writes_rx),
            shutdown: shutdown_tx,
            running: running_tx,
        }
    }

    /// Replace the wall clock (tests use [`crate::clock::ManualClock`]).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Document store whose writes are reported to this engine.
    #[must_use]
    pub fn observed_document_store(&self) -> Arc<dyn DocumentStore> {
        Arc::new(ObservedDocumentStore::new(Arc::clone(&self.documents), self.writes_tx.clone()))
    }

    /// Key/value store whose writes are reported to this engine.
    #[must_use]
    pub fn observed_key_value_store(&self) -> Arc<dyn KeyValueStore> {
        Arc::new(ObservedKeyValueStore::new(Arc::clone(&self.key_values), self.writes_tx.clone()))
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Get current debouncer state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub(super) fn set_state(&self, state: SyncState) {
        self.state.send_if_modified(|s| {
            let changed = *s != state;
            *s = state;
            changed
        });
        crate::metrics::set_engine_state(&state.to_string().to_lowercase());
    }
}

/// Clears the in-flight flag when a flush ends, however it ends.
pub(super) struct FlushGuard<'a>(&'a AtomicBool);

impl<'a> FlushGuard<'a> {
    /// `None` if a flush already holds the flag.
    pub(super) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_flush_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = FlushGuard::acquire(&flag);
        assert!(guard.is_some());
        assert!(FlushGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(FlushGuard::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn test_new_engine_is_idle() {
        let h = harness(SyncConfig::default());
        assert_eq!(h.engine.state(), SyncState::Idle);
        assert!(h.engine.is_enabled());
        assert!(!h.engine.is_syncing());
        assert!(h.engine.last_sync_time().is_none());
    }

    #[tokio::test]
    async fn test_disabled_config_starts_disabled() {
        let h = harness(SyncConfig {
            enabled: false,
            ..SyncConfig::default()
        });
        assert!(!h.engine.is_enabled());
    }

    #[tokio::test]
    async fn test_client_ready_timeout_reaches_session() {
        let h = harness(SyncConfig {
            client_ready_timeout_ms: 1500,
            ..SyncConfig::default()
        });
        assert_eq!(h.engine.session().ready_timeout(), std::time::Duration::from_millis(1500));
    }
}
