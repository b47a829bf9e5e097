// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process stores and backend.
//!
//! Used by tests and demos. [`MemoryBackend`] enforces conflict targets the
//! way the hosted tables do, so idempotence can be asserted directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use super::traits::{AuthClient, DocumentDb, DocumentStore, Identity, KeyValueStore, RemoteBackend};
use crate::descriptor::OWNER_COLUMN;
use crate::error::SyncError;
use crate::normalize::as_text;

#[derive(Debug, Default)]
struct Collection {
    key_path: Option<String>,
    rows: Vec<Value>,
}

/// One named, versioned document database.
#[derive(Debug)]
pub struct MemoryDocumentDb {
    name: String,
    version: u32,
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryDocumentDb {
    /// Drop every row but keep the schema.
    pub fn clear_rows(&self) {
        for collection in self.collections.write().values_mut() {
            collection.rows.clear();
        }
    }

    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, |c| c.rows.len())
    }
}

#[async_trait]
impl DocumentDb for MemoryDocumentDb {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    async fn collections(&self) -> Result<Vec<String>, SyncError> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn has_collection(&self, collection: &str) -> Result<bool, SyncError> {
        Ok(self.collections.read().contains_key(collection))
    }

    async fn count(&self, collection: &str) -> Result<u64, SyncError> {
        Ok(self.len(collection) as u64)
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Value>, SyncError> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.rows.clone())
            .ok_or_else(|| SyncError::Local(format!("no collection '{collection}' in {}", self.name)))
    }

    async fn put(&self, collection: &str, value: &Value) -> Result<(), SyncError> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| SyncError::Local(format!("no collection '{collection}' in {}", self.name)))?;

        let key = target
            .key_path
            .as_deref()
            .and_then(|path| value.get(path))
            .filter(|k| !k.is_null())
            .cloned();

        if let (Some(path), Some(key)) = (target.key_path.as_deref(), key) {
            if let Some(existing) = target.rows.iter_mut().find(|row| row.get(path) == Some(&key)) {
                *existing = value.clone();
                return Ok(());
            }
        }
        target.rows.push(value.clone());
        Ok(())
    }
}

/// Document store holding any number of [`MemoryDocumentDb`]s.
#[derive(Default)]
pub struct MemoryDocumentStore {
    dbs: DashMap<String, Arc<MemoryDocumentDb>>,
    open_delay: Mutex<Option<Duration>>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a database with the given `(collection, key path)` schema.
    pub fn create_database(
        &self,
        name: &str,
        version: u32,
        schema: &[(&str, Option<&str>)],
    ) -> Arc<MemoryDocumentDb> {
        let collections = schema
            .iter()
            .map(|(collection, key_path)| {
                (
                    (*collection).to_string(),
                    Collection {
                        key_path: key_path.map(str::to_string),
                        rows: Vec::new(),
                    },
                )
            })
            .collect();
        let db = Arc::new(MemoryDocumentDb {
            name: name.to_string(),
            version,
            collections: RwLock::new(collections),
        });
        self.dbs.insert(name.to_string(), Arc::clone(&db));
        db
    }

    #[must_use]
    pub fn database(&self, name: &str) -> Option<Arc<MemoryDocumentDb>> {
        self.dbs.get(name).map(|db| Arc::clone(db.value()))
    }

    /// Remove every database, as a browser cache clear would.
    pub fn wipe(&self) {
        self.dbs.clear();
    }

    /// Make every `open` stall for `delay` (simulates a blocked upgrade).
    pub fn set_open_delay(&self, delay: Option<Duration>) {
        *self.open_delay.lock() = delay;
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn open(&self, name: &str, version: u32) -> Result<Option<Arc<dyn DocumentDb>>, SyncError> {
        let delay = *self.open_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .dbs
            .get(name)
            .filter(|db| db.version == version)
            .map(|db| Arc::clone(db.value()) as Arc<dyn DocumentDb>))
    }
}

/// Key/value store over a `DashMap`.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    items: DashMap<String, String>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.items.get(key).map(|v| v.value().clone())
    }

    pub fn wipe(&self) {
        self.items.clear();
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, SyncError> {
        Ok(self.get(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), SyncError> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, SyncError> {
        let mut keys: Vec<String> = self.items.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}

/// A logged backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Upsert { table: String, conflict: Vec<String> },
    Count { table: String },
    SelectAll { table: String },
    UploadBlob { bucket: String, path: String },
    DownloadBlob { bucket: String, path: String },
}

/// In-process tables and buckets.
#[derive(Default)]
pub struct MemoryBackend {
    tables: DashMap<String, Vec<Map<String, Value>>>,
    blobs: DashMap<(String, String), Vec<u8>>,
    calls: Mutex<Vec<BackendCall>>,
    upserts: AtomicUsize,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row directly (bypasses conflict handling).
    pub fn insert_row(&self, table: &str, row: Map<String, Value>) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    pub fn insert_blob(&self, bucket: &str, path: &str, bytes: Vec<u8>) {
        self.blobs.insert((bucket.to_string(), path.to_string()), bytes);
    }

    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Map<String, Value>> {
        self.tables.get(table).map(|t| t.value().clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn blob(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.blobs
            .get(&(bucket.to_string(), path.to_string()))
            .map(|b| b.value().clone())
    }

    #[must_use]
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    fn log(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }
}

fn owned_by(row: &Map<String, Value>, identity: &Identity) -> bool {
    row.get(OWNER_COLUMN).and_then(Value::as_str) == Some(identity.user_id.as_str())
}

fn same_target(a: &Map<String, Value>, b: &Map<String, Value>, conflict: &[&str]) -> bool {
    conflict
        .iter()
        .all(|c| a.get(*c).and_then(as_text) == b.get(*c).and_then(as_text))
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    async fn upsert(
        &self,
        identity: &Identity,
        table: &str,
        row: &Map<String, Value>,
        conflict: &[&str],
    ) -> Result<(), SyncError> {
        self.log(BackendCall::Upsert {
            table: table.to_string(),
            conflict: conflict.iter().map(|c| (*c).to_string()).collect(),
        });
        self.upserts.fetch_add(1, Ordering::SeqCst);

        if !owned_by(row, identity) {
            return Err(SyncError::Transport {
                status: Some(403),
                message: "row violates owner policy".into(),
            });
        }

        let mut rows = self.tables.entry(table.to_string()).or_default();
        match rows.iter_mut().find(|existing| same_target(existing, row, conflict)) {
            Some(existing) => {
                for (column, value) in row {
                    existing.insert(column.clone(), value.clone());
                }
            }
            None => rows.push(row.clone()),
        }
        Ok(())
    }

    async fn count(&self, identity: &Identity, table: &str) -> Result<u64, SyncError> {
        self.log(BackendCall::Count { table: table.to_string() });
        Ok(self
            .tables
            .get(table)
            .map_or(0, |rows| rows.iter().filter(|r| owned_by(r, identity)).count() as u64))
    }

    async fn select_all(&self, identity: &Identity, table: &str) -> Result<Vec<Map<String, Value>>, SyncError> {
        self.log(BackendCall::SelectAll { table: table.to_string() });
        Ok(self
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| owned_by(r, identity)).cloned().collect())
            .unwrap_or_default())
    }

    async fn upload_blob(
        &self,
        _identity: &Identity,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), SyncError> {
        self.log(BackendCall::UploadBlob {
            bucket: bucket.to_string(),
            path: path.to_string(),
        });
        self.insert_blob(bucket, path, bytes);
        Ok(())
    }

    async fn download_blob(&self, _identity: &Identity, bucket: &str, path: &str) -> Result<Vec<u8>, SyncError> {
        self.log(BackendCall::DownloadBlob {
            bucket: bucket.to_string(),
            path: path.to_string(),
        });
        self.blob(bucket, path).ok_or_else(|| SyncError::Transport {
            status: Some(404),
            message: format!("object {bucket}/{path} not found"),
        })
    }
}

/// Accounts keyed by email; sessions are minted on sign-in.
#[derive(Default)]
pub struct MemoryAuth {
    accounts: DashMap<String, (String, String)>,
    session: Mutex<Option<Identity>>,
    sign_ins: AtomicUsize,
    sign_ups: AtomicUsize,
}

impl MemoryAuth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register an account; returns its user id.
    pub fn register(&self, email: &str, password: &str) -> String {
        let user_id = uuid::Uuid::new_v4().to_string();
        self.accounts
            .insert(email.to_string(), (password.to_string(), user_id.clone()));
        user_id
    }

    #[must_use]
    pub fn sign_in_count(&self) -> usize {
        self.sign_ins.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sign_up_count(&self) -> usize {
        self.sign_ups.load(Ordering::SeqCst)
    }

    fn mint(&self, email: &str, user_id: String) -> Identity {
        let identity = Identity {
            user_id,
            email: Some(email.to_string()),
            access_token: uuid::Uuid::new_v4().simple().to_string(),
        };
        *self.session.lock() = Some(identity.clone());
        identity
    }
}

#[async_trait]
impl AuthClient for MemoryAuth {
    async fn current_session(&self) -> Result<Option<Identity>, SyncError> {
        Ok(self.session.lock().clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, SyncError> {
        self.sign_ins.fetch_add(1, Ordering::SeqCst);
        let user_id = match self.accounts.get(email) {
            Some(entry) if entry.value().0 == password => entry.value().1.clone(),
            _ => return Err(SyncError::AuthFailed("invalid login credentials".into())),
        };
        Ok(self.mint(email, user_id))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, SyncError> {
        self.sign_ups.fetch_add(1, Ordering::SeqCst);
        if self.accounts.contains_key(email) {
            return Err(SyncError::AuthFailed("user already registered".into()));
        }
        let user_id = self.register(email, password);
        Ok(self.mint(email, user_id))
    }
}
