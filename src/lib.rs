// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Backup Sync
//!
//! Continuous backup of a client application's local data to a remote
//! table + object store, and restore after the local data is cleared.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Observed Local Stores                    │
//! │  • Document databases (collections of JSON documents)      │
//! │  • String key/value store (JSON-encoded values)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  every persisted write
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Change Detector                        │
//! │  • Classifies writes by collection / key name and shape    │
//! │  • Expands arrays and maps into one record per element     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Sync Queue + Debouncer                     │
//! │  • Deduplicated by record type + natural key               │
//! │  • Flushes after a quiet period, one flush at a time       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Uploader                            │
//! │  • One declarative descriptor per record type              │
//! │  • Blob first, then idempotent upsert on the natural key   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! On start the engine checks whether local storage was cleared while the
//! backend still holds data, and if so restores every record type.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use backup_sync::{KeyValueStore, SyncConfig, SyncEngine};
//! use backup_sync::clock::SystemClock;
//! use backup_sync::session::{SessionPolicy, SessionProvider};
//! use backup_sync::storage::rest::{RestAuth, RestBackend, RestConfig};
//! use backup_sync::storage::sqlite::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), backup_sync::SyncError> {
//!     let rest = RestConfig {
//!         base_url: "https://backend.example.org".into(),
//!         api_key: "public-anon-key".into(),
//!         timeout_secs: 30,
//!     };
//!     let local = Arc::new(SqliteStore::new("sqlite://local.db?mode=rwc").await?);
//!     let session = SessionProvider::ready(
//!         Arc::new(RestAuth::new(&rest)?),
//!         SessionPolicy::anonymous("devices.example.org"),
//!         local.clone(),
//!         Arc::new(SystemClock),
//!     );
//!     let engine = Arc::new(SyncEngine::new(
//!         SyncConfig::default(),
//!         Arc::new(session),
//!         local.clone(),
//!         local,
//!         Arc::new(RestBackend::new(&rest)?),
//!     ));
//!
//!     engine.start().await?;
//!     let runner = Arc::clone(&engine);
//!     tokio::spawn(async move { runner.run().await });
//!
//!     // The host writes through the observed stores
//!     let kv = engine.observed_key_value_store();
//!     kv.set_item("quotes", r#"[{"quoteNumber":"Q-1","total":"£120"}]"#).await?;
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`SyncEngine`] tying everything together
//! - [`detect`]: Write classification into typed records
//! - [`descriptor`]: Per-type remote table, key and column mapping
//! - [`queue`]: Key-deduplicated pending set
//! - [`session`]: Remote session establishment
//! - [`storage`]: Local store and backend traits plus implementations
//! - [`status`]: User-visible backup status
//! - [`resilience`]: Retry logic

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod descriptor;
pub mod detect;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod queue;
pub mod record;
pub mod resilience;
pub mod session;
pub mod status;
pub mod storage;

pub use config::SyncConfig;
pub use coordinator::{
    FlushReport, PartialRestoreFailure, RestoreOutcome, RestoreReport, SyncEngine, SyncState, UploadOutcome,
};
pub use detect::RawWrite;
pub use error::SyncError;
pub use queue::FlushReason;
pub use record::{Record, RecordType};
pub use resilience::retry::RetryConfig;
pub use status::{Indicator, StatusBoard, SyncStatus};
pub use storage::traits::{AuthClient, DocumentDb, DocumentStore, Identity, KeyValueStore, RemoteBackend};
pub use metrics::LatencyTimer;
