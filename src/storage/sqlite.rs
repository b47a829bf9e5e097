// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite-backed local store.
//!
//! Persists both local store shapes in one file so a host without a browser
//! can run the engine against real storage:
//!
//! ```sql
//! CREATE TABLE databases   (name TEXT PRIMARY KEY, version INTEGER NOT NULL);
//! CREATE TABLE collections (db TEXT, name TEXT, key_path TEXT, PRIMARY KEY (db, name));
//! CREATE TABLE documents   (id INTEGER PRIMARY KEY AUTOINCREMENT,
//!                           db TEXT, collection TEXT, doc_key TEXT, body TEXT);
//! CREATE TABLE kv          (key TEXT PRIMARY KEY, value TEXT NOT NULL);
//! ```
//!
//! Document bodies are JSON text. `doc_key` holds the value at the
//! collection's key path (NULL when there is none), with a unique index so
//! keyed puts replace.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::traits::{DocumentDb, DocumentStore, KeyValueStore};
use crate::error::SyncError;
use crate::normalize::as_text;
use crate::resilience::retry::{retry, RetryConfig};

fn local_err(e: sqlx::Error) -> SyncError {
    SyncError::Local(e.to_string())
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect with startup-mode retry (fails fast if the path is wrong).
    pub async fn new(connection_string: &str) -> Result<Self, SyncError> {
        let pool = retry("sqlite_connect", &RetryConfig::startup(), || async {
            SqlitePoolOptions::new()
                .max_connections(4)
                .acquire_timeout(Duration::from_secs(10))
                .connect(connection_string)
                .await
                .map_err(|e| SyncError::StoreUnavailable(e.to_string()))
        })
        .await?;

        let store = Self { pool };
        store.enable_wal_mode().await?;
        store.init_schema().await?;
        Ok(store)
    }

    /// WAL lets restore reads proceed while the host keeps writing.
    async fn enable_wal_mode(&self) -> Result<(), SyncError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Local(format!("Failed to enable WAL mode: {e}")))?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Local(format!("Failed to set synchronous mode: {e}")))?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), SyncError> {
        const SCHEMA: [&str; 5] = [
            "CREATE TABLE IF NOT EXISTS databases (name TEXT PRIMARY KEY, version INTEGER NOT NULL)",
            "CREATE TABLE IF NOT EXISTS collections (
                db TEXT NOT NULL,
                name TEXT NOT NULL,
                key_path TEXT,
                PRIMARY KEY (db, name)
            )",
            "CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                db TEXT NOT NULL,
                collection TEXT NOT NULL,
                doc_key TEXT,
                body TEXT NOT NULL
            )",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_key ON documents (db, collection, doc_key)",
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        ];

        for sql in SCHEMA {
            retry("sqlite_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(sql).execute(&self.pool).await.map_err(local_err)
            })
            .await?;
        }
        Ok(())
    }

    /// Create a database with its `(collection, key path)` schema. An existing
    /// database of the same name is replaced, rows included.
    pub async fn create_database(
        &self,
        name: &str,
        version: u32,
        schema: &[(&str, Option<&str>)],
    ) -> Result<(), SyncError> {
        let mut tx = self.pool.begin().await.map_err(local_err)?;
        for sql in [
            "DELETE FROM documents WHERE db = ?",
            "DELETE FROM collections WHERE db = ?",
            "DELETE FROM databases WHERE name = ?",
        ] {
            sqlx::query(sql).bind(name).execute(&mut *tx).await.map_err(local_err)?;
        }
        sqlx::query("INSERT INTO databases (name, version) VALUES (?, ?)")
            .bind(name)
            .bind(i64::from(version))
            .execute(&mut *tx)
            .await
            .map_err(local_err)?;
        for (collection, key_path) in schema {
            sqlx::query("INSERT INTO collections (db, name, key_path) VALUES (?, ?, ?)")
                .bind(name)
                .bind(*collection)
                .bind(*key_path)
                .execute(&mut *tx)
                .await
                .map_err(local_err)?;
        }
        tx.commit().await.map_err(local_err)
    }

    /// Delete every database and key, as a browser cache clear would.
    pub async fn wipe(&self) -> Result<(), SyncError> {
        for sql in ["DELETE FROM documents", "DELETE FROM collections", "DELETE FROM databases", "DELETE FROM kv"] {
            sqlx::query(sql).execute(&self.pool).await.map_err(local_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn open(&self, name: &str, version: u32) -> Result<Option<Arc<dyn DocumentDb>>, SyncError> {
        let row = sqlx::query("SELECT version FROM databases WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(local_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let stored: i64 = row.try_get("version").map_err(local_err)?;
        if stored != i64::from(version) {
            return Ok(None);
        }
        Ok(Some(Arc::new(SqliteDocumentDb {
            pool: self.pool.clone(),
            name: name.to_string(),
            version,
        })))
    }
}

struct SqliteDocumentDb {
    pool: SqlitePool,
    name: String,
    version: u32,
}

impl SqliteDocumentDb {
    async fn key_path(&self, collection: &str) -> Result<Option<Option<String>>, SyncError> {
        let row = sqlx::query("SELECT key_path FROM collections WHERE db = ? AND name = ?")
            .bind(&self.name)
            .bind(collection)
            .fetch_optional(&self.pool)
            .await
            .map_err(local_err)?;
        row.map(|r| r.try_get::<Option<String>, _>("key_path").map_err(local_err))
            .transpose()
    }
}

#[async_trait]
impl DocumentDb for SqliteDocumentDb {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    async fn collections(&self) -> Result<Vec<String>, SyncError> {
        let rows = sqlx::query("SELECT name FROM collections WHERE db = ? ORDER BY name")
            .bind(&self.name)
            .fetch_all(&self.pool)
            .await
            .map_err(local_err)?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("name").map_err(local_err))
            .collect()
    }

    async fn has_collection(&self, collection: &str) -> Result<bool, SyncError> {
        Ok(self.key_path(collection).await?.is_some())
    }

    async fn count(&self, collection: &str) -> Result<u64, SyncError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM documents WHERE db = ? AND collection = ?")
            .bind(&self.name)
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(local_err)?;
        let n: i64 = row.try_get("n").map_err(local_err)?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Value>, SyncError> {
        if self.key_path(collection).await?.is_none() {
            return Err(SyncError::Local(format!("no collection '{collection}' in {}", self.name)));
        }
        let rows = sqlx::query("SELECT body FROM documents WHERE db = ? AND collection = ? ORDER BY id")
            .bind(&self.name)
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(local_err)?;

        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row.try_get("body").map_err(local_err)?;
            values.push(serde_json::from_str(&body)?);
        }
        Ok(values)
    }

    async fn put(&self, collection: &str, value: &Value) -> Result<(), SyncError> {
        let Some(key_path) = self.key_path(collection).await? else {
            return Err(SyncError::Local(format!("no collection '{collection}' in {}", self.name)));
        };
        let doc_key = key_path
            .as_deref()
            .and_then(|path| value.get(path))
            .and_then(as_text);
        let body = serde_json::to_string(value)?;

        sqlx::query(
            "INSERT INTO documents (db, collection, doc_key, body) VALUES (?, ?, ?, ?)
             ON CONFLICT (db, collection, doc_key) DO UPDATE SET body = excluded.body",
        )
        .bind(&self.name)
        .bind(collection)
        .bind(doc_key)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(local_err)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, SyncError> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(local_err)?;
        row.map(|r| r.try_get::<String, _>("value").map_err(local_err))
            .transpose()
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), SyncError> {
        sqlx::query("INSERT INTO kv (key, value) VALUES (?, ?) ON CONFLICT (key) DO UPDATE SET value = excluded.value")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(local_err)?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, SyncError> {
        let rows = sqlx::query("SELECT key FROM kv ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(local_err)?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("key").map_err(local_err))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("local.db").display());
        (SqliteStore::new(&url).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn test_open_checks_version() {
        let (store, _dir) = store().await;
        store
            .create_database("PEBLGrantsBudgets", 6, &[("projects", Some("projectName"))])
            .await
            .unwrap();

        assert!(store.open("PEBLGrantsBudgets", 6).await.unwrap().is_some());
        assert!(store.open("PEBLGrantsBudgets", 7).await.unwrap().is_none());
        assert!(store.open("MarineSpeciesSketcherDB", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keyed_put_replaces_unkeyed_appends() {
        let (store, _dir) = store().await;
        store
            .create_database("Budgets", 6, &[("projects", Some("projectName")), ("log", None)])
            .await
            .unwrap();
        let db = store.open("Budgets", 6).await.unwrap().unwrap();

        db.put("projects", &json!({"projectName": "Kelp", "v": 1})).await.unwrap();
        db.put("projects", &json!({"projectName": "Kelp", "v": 2})).await.unwrap();
        db.put("log", &json!({"n": 1})).await.unwrap();
        db.put("log", &json!({"n": 1})).await.unwrap();

        assert_eq!(db.get_all("projects").await.unwrap(), vec![json!({"projectName": "Kelp", "v": 2})]);
        assert_eq!(db.count("log").await.unwrap(), 2);
        assert_eq!(db.collections().await.unwrap(), vec!["log".to_string(), "projects".to_string()]);
        assert!(db.put("missing", &json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_kv_and_wipe() {
        let (store, _dir) = store().await;
        store.set_item("darkMode", "true").await.unwrap();
        store.set_item("darkMode", "false").await.unwrap();
        assert_eq!(store.get_item("darkMode").await.unwrap().as_deref(), Some("false"));
        assert_eq!(store.keys().await.unwrap(), vec!["darkMode".to_string()]);

        store.wipe().await.unwrap();
        assert!(store.get_item("darkMode").await.unwrap().is_none());
    }
}
