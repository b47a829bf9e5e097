// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded, failure-tolerant access to the local stores.
//!
//! Every failure here degrades to "no local data": an unopenable database is
//! `None`, a missing collection is empty. The engine never crashes the host
//! because its local storage misbehaves.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::traits::{DocumentDb, DocumentStore, KeyValueStore};
use crate::error::SyncError;

/// Handle to an opened document database.
pub type DocumentHandle = Arc<dyn DocumentDb>;

#[derive(Clone)]
pub struct LocalStoreAccessor {
    documents: Arc<dyn DocumentStore>,
    key_values: Arc<dyn KeyValueStore>,
    open_timeout: Duration,
}

impl LocalStoreAccessor {
    pub fn new(documents: Arc<dyn DocumentStore>, key_values: Arc<dyn KeyValueStore>, open_timeout: Duration) -> Self {
        Self {
            documents,
            key_values,
            open_timeout,
        }
    }

    /// Open a database, bounded by the configured timeout.
    pub async fn open_store(&self, name: &str, version: u32) -> Option<DocumentHandle> {
        let err = match tokio::time::timeout(self.open_timeout, self.documents.open(name, version)).await {
            Ok(Ok(Some(db))) => return Some(db),
            Ok(Ok(None)) => SyncError::StoreUnavailable(format!("{name} v{version} does not exist")),
            Ok(Err(e)) => SyncError::StoreUnavailable(format!("{name}: {e}")),
            Err(_) => SyncError::StoreUnavailable(format!("{name}: open timed out after {:?}", self.open_timeout)),
        };
        debug!(error = %err, "Local store not opened");
        None
    }

    /// True only if the collection exists and holds at least one row.
    pub async fn collection_has_rows(&self, db: &DocumentHandle, collection: &str) -> bool {
        match db.has_collection(collection).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(db = db.name(), collection, error = %e, "Collection check failed");
                return false;
            }
        }
        match db.count(collection).await {
            Ok(n) => n > 0,
            Err(e) => {
                warn!(db = db.name(), collection, error = %e, "Collection count failed");
                false
            }
        }
    }

    /// All rows in a collection; missing or unreadable reads as empty.
    pub async fn read_all(&self, db: &DocumentHandle, collection: &str) -> Vec<Value> {
        if !matches!(db.has_collection(collection).await, Ok(true)) {
            return Vec::new();
        }
        db.get_all(collection).await.unwrap_or_else(|e| {
            warn!(db = db.name(), collection, error = %e, "Collection read failed");
            Vec::new()
        })
    }

    pub async fn write_record(&self, db: &DocumentHandle, collection: &str, value: &Value) -> Result<(), SyncError> {
        db.put(collection, value).await
    }

    /// Collection names of an opened database.
    pub async fn collections(&self, db: &DocumentHandle) -> Vec<String> {
        db.collections().await.unwrap_or_default()
    }

    pub async fn get_item(&self, key: &str) -> Option<String> {
        match self.key_values.get_item(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "Key/value read failed");
                None
            }
        }
    }

    pub async fn set_item(&self, key: &str, value: &str) -> Result<(), SyncError> {
        self.key_values.set_item(key, value).await
    }

    pub async fn keys(&self) -> Vec<String> {
        self.key_values.keys().await.unwrap_or_default()
    }

    /// The raw key/value store, for session credential persistence.
    #[must_use]
    pub fn key_values(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.key_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryDocumentStore, MemoryKeyValueStore};
    use serde_json::json;

    fn accessor(store: Arc<MemoryDocumentStore>) -> LocalStoreAccessor {
        LocalStoreAccessor::new(store, Arc::new(MemoryKeyValueStore::new()), Duration::from_secs(3))
    }

    #[tokio::test]
    async fn test_missing_database_is_none() {
        let local = accessor(Arc::new(MemoryDocumentStore::new()));
        assert!(local.open_store("PEBLGrantsBudgets", 6).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_times_out() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.create_database("PEBLGrantsBudgets", 6, &[("projects", None)]);
        store.set_open_delay(Some(Duration::from_secs(10)));

        let local = accessor(store);
        let started = tokio::time::Instant::now();
        assert!(local.open_store("PEBLGrantsBudgets", 6).await.is_none());
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_collection_has_rows() {
        let store = Arc::new(MemoryDocumentStore::new());
        let db = store.create_database("PEBLGrantsBudgets", 6, &[("projects", None), ("csvFiles", None)]);
        db.put("projects", &json!({"projectName": "Kelp"})).await.unwrap();

        let local = accessor(store);
        let handle = local.open_store("PEBLGrantsBudgets", 6).await.unwrap();
        assert!(local.collection_has_rows(&handle, "projects").await);
        assert!(!local.collection_has_rows(&handle, "csvFiles").await);
        assert!(!local.collection_has_rows(&handle, "invoices").await);
        assert!(local.read_all(&handle, "invoices").await.is_empty());
    }
}
