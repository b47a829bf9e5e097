// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write interception.
//!
//! The observed wrappers forward every write to the inner store unchanged and
//! only after it succeeds publish a [`RawWrite`] to the engine. A write is never
//! rejected or delayed by the observer, and a dropped receiver is ignored.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use super::traits::{DocumentDb, DocumentStore, KeyValueStore};
use crate::detect::RawWrite;
use crate::error::SyncError;

pub struct ObservedDocumentStore {
    inner: Arc<dyn DocumentStore>,
    tx: UnboundedSender<RawWrite>,
}

impl ObservedDocumentStore {
    pub fn new(inner: Arc<dyn DocumentStore>, tx: UnboundedSender<RawWrite>) -> Self {
        Self { inner, tx }
    }
}

#[async_trait]
impl DocumentStore for ObservedDocumentStore {
    async fn open(&self, name: &str, version: u32) -> Result<Option<Arc<dyn DocumentDb>>, SyncError> {
        Ok(self.inner.open(name, version).await?.map(|db| {
            Arc::new(ObservedDocumentDb {
                inner: db,
                tx: self.tx.clone(),
            }) as Arc<dyn DocumentDb>
        }))
    }
}

struct ObservedDocumentDb {
    inner: Arc<dyn DocumentDb>,
    tx: UnboundedSender<RawWrite>,
}

#[async_trait]
impl DocumentDb for ObservedDocumentDb {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn version(&self) -> u32 {
        self.inner.version()
    }

    async fn collections(&self) -> Result<Vec<String>, SyncError> {
        self.inner.collections().await
    }

    async fn has_collection(&self, collection: &str) -> Result<bool, SyncError> {
        self.inner.has_collection(collection).await
    }

    async fn count(&self, collection: &str) -> Result<u64, SyncError> {
        self.inner.count(collection).await
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Value>, SyncError> {
        self.inner.get_all(collection).await
    }

    async fn put(&self, collection: &str, value: &Value) -> Result<(), SyncError> {
        self.inner.put(collection, value).await?;
        let _ = self.tx.send(RawWrite::document(collection, value.clone()));
        Ok(())
    }
}

pub struct ObservedKeyValueStore {
    inner: Arc<dyn KeyValueStore>,
    tx: UnboundedSender<RawWrite>,
}

impl ObservedKeyValueStore {
    pub fn new(inner: Arc<dyn KeyValueStore>, tx: UnboundedSender<RawWrite>) -> Self {
        Self { inner, tx }
    }
}

#[async_trait]
impl KeyValueStore for ObservedKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, SyncError> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), SyncError> {
        self.inner.set_item(key, value).await?;
        let _ = self.tx.send(RawWrite::key_value(key, value));
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, SyncError> {
        self.inner.keys().await
    }
}
