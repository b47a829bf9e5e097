// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::SyncError;

/// Authenticated principal for remote calls.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    /// Bearer token; never printed
    pub access_token: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Opens named, versioned document databases.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `Ok(None)` when the database does not exist or its version differs.
    async fn open(&self, name: &str, version: u32) -> Result<Option<Arc<dyn DocumentDb>>, SyncError>;
}

/// An opened document database.
#[async_trait]
pub trait DocumentDb: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> u32;
    async fn collections(&self) -> Result<Vec<String>, SyncError>;
    async fn has_collection(&self, collection: &str) -> Result<bool, SyncError>;
    async fn count(&self, collection: &str) -> Result<u64, SyncError>;
    async fn get_all(&self, collection: &str) -> Result<Vec<Value>, SyncError>;
    async fn put(&self, collection: &str, value: &Value) -> Result<(), SyncError>;
}

/// String key/value store holding JSON-encoded values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, SyncError>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), SyncError>;
    async fn keys(&self) -> Result<Vec<String>, SyncError>;
}

/// Remote tables plus blob storage, scoped per identity.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Insert or update the row matching `conflict` columns.
    async fn upsert(
        &self,
        identity: &Identity,
        table: &str,
        row: &Map<String, Value>,
        conflict: &[&str],
    ) -> Result<(), SyncError>;

    /// Rows owned by `identity` in `table`.
    async fn count(&self, identity: &Identity, table: &str) -> Result<u64, SyncError>;

    async fn select_all(&self, identity: &Identity, table: &str) -> Result<Vec<Map<String, Value>>, SyncError>;

    /// Overwrites any existing object at `path`.
    async fn upload_blob(
        &self,
        identity: &Identity,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), SyncError>;

    async fn download_blob(&self, identity: &Identity, bucket: &str, path: &str) -> Result<Vec<u8>, SyncError>;
}

/// Password-based authentication against the backend.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// A session that is still live, if any.
    async fn current_session(&self) -> Result<Option<Identity>, SyncError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, SyncError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_debug_redacts_token() {
        let identity = Identity {
            user_id: "u1".into(),
            email: Some("a@b.c".into()),
            access_token: "secret-jwt".into(),
        };
        let printed = format!("{identity:?}");
        assert!(printed.contains("u1"));
        assert!(!printed.contains("secret-jwt"));
    }
}
