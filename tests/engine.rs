// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Integration tests for the backup engine.
//!
//! Everything runs against the in-memory stores and backend, on paused
//! tokio time so debounce windows elapse instantly and deterministically.
//!
//! Run with: `cargo test --test engine`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use backup_sync::clock::ManualClock;
use backup_sync::session::{SessionPolicy, SessionProvider};
use backup_sync::storage::memory::{BackendCall, MemoryAuth, MemoryBackend, MemoryDocumentStore, MemoryKeyValueStore};
use backup_sync::{
    DocumentDb, DocumentStore, Identity, KeyValueStore, Record, RecordType, RemoteBackend, RestoreOutcome, SyncConfig,
    SyncEngine, SyncError, SyncState,
};

// =============================================================================
// Fixtures
// =============================================================================

struct Fixture {
    engine: Arc<SyncEngine>,
    documents: Arc<MemoryDocumentStore>,
    key_values: Arc<MemoryKeyValueStore>,
    backend: Arc<MemoryBackend>,
}

fn config() -> SyncConfig {
    SyncConfig {
        retry_delay_ms: 10,
        ..SyncConfig::default()
    }
}

fn fixture_with(backend: Arc<dyn RemoteBackend>, memory: Arc<MemoryBackend>) -> Fixture {
    let documents = Arc::new(MemoryDocumentStore::new());
    let key_values = Arc::new(MemoryKeyValueStore::new());
    let clock = Arc::new(ManualClock::new(
        chrono::DateTime::parse_from_rfc3339("2024-01-05T12:00:00Z")
            .unwrap()
            .into(),
    ));
    let session = SessionProvider::ready(
        Arc::new(MemoryAuth::new()),
        SessionPolicy::anonymous("devices.test"),
        key_values.clone(),
        clock.clone(),
    );
    let engine = SyncEngine::new(config(), Arc::new(session), documents.clone(), key_values.clone(), backend)
        .with_clock(clock);
    Fixture {
        engine: Arc::new(engine),
        documents,
        key_values,
        backend: memory,
    }
}

fn fixture() -> Fixture {
    let backend = Arc::new(MemoryBackend::new());
    fixture_with(backend.clone(), backend)
}

fn owned(user_id: &str, row: Value) -> Map<String, Value> {
    let mut row = row.as_object().cloned().unwrap();
    row.insert("user_id".into(), json!(user_id));
    row
}

async fn user_id(engine: &SyncEngine) -> String {
    engine.session().ensure_session().await.unwrap().user_id
}

fn budget_schema() -> [(&'static str, Option<&'static str>); 3] {
    [("projects", Some("id")), ("csvFiles", Some("fileName")), ("invoices", Some("filename"))]
}

/// Backend that takes a while to accept each upsert.
struct SlowBackend {
    inner: Arc<MemoryBackend>,
    delay: Duration,
}

#[async_trait]
impl RemoteBackend for SlowBackend {
    async fn upsert(
        &self,
        identity: &Identity,
        table: &str,
        row: &Map<String, Value>,
        conflict: &[&str],
    ) -> Result<(), SyncError> {
        tokio::time::sleep(self.delay).await;
        self.inner.upsert(identity, table, row, conflict).await
    }

    async fn count(&self, identity: &Identity, table: &str) -> Result<u64, SyncError> {
        self.inner.count(identity, table).await
    }

    async fn select_all(&self, identity: &Identity, table: &str) -> Result<Vec<Map<String, Value>>, SyncError> {
        self.inner.select_all(identity, table).await
    }

    async fn upload_blob(
        &self,
        identity: &Identity,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), SyncError> {
        self.inner.upload_blob(identity, bucket, path, bytes, content_type).await
    }

    async fn download_blob(&self, identity: &Identity, bucket: &str, path: &str) -> Result<Vec<u8>, SyncError> {
        self.inner.download_blob(identity, bucket, path).await
    }
}

// =============================================================================
// Debounce and upload
// =============================================================================

#[tokio::test(start_paused = true)]
async fn rapid_writes_coalesce_into_one_upsert() {
    let f = fixture();
    let runner = Arc::clone(&f.engine);
    let handle = tokio::spawn(async move { runner.run().await });

    let kv = f.engine.observed_key_value_store();
    let transactions = r#"[{"date":"05/01/2024","description":"Paint","spent":"£42.50"}]"#;
    for _ in 0..3 {
        kv.set_item("transactions", transactions).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert_eq!(f.backend.upsert_count(), 0, "still inside the quiet period");

    tokio::time::sleep(Duration::from_secs(3)).await;

    let upserts: Vec<_> = f
        .backend
        .calls()
        .into_iter()
        .filter(|c| matches!(c, BackendCall::Upsert { .. }))
        .collect();
    assert_eq!(
        upserts,
        vec![BackendCall::Upsert {
            table: "transactions".into(),
            conflict: vec!["user_id".into(), "date".into(), "description".into(), "amount".into()],
        }]
    );

    let rows = f.backend.rows("transactions");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["date"], json!("2024-01-05"));
    assert_eq!(rows[0]["description"], json!("Paint"));
    assert_eq!(rows[0]["amount"].as_f64(), Some(-42.5));
    assert!(f.engine.last_sync_time().is_some());
    assert_eq!(f.engine.state(), SyncState::Idle);

    f.engine.shutdown().await;
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn repeated_uploads_are_idempotent() {
    let f = fixture();
    let quote = || Record::new(RecordType::Quote, json!({"quoteNumber": "Q-7", "total": "£100"}));

    f.engine.enqueue(quote());
    f.engine.sync_now().await.unwrap();
    f.engine.enqueue(quote());
    f.engine.sync_now().await.unwrap();

    assert_eq!(f.backend.upsert_count(), 2);
    let rows = f.backend.rows("quotes");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["quote_number"], json!("Q-7"));
    assert_eq!(rows[0]["status"], json!("draft"));
}

#[tokio::test(start_paused = true)]
async fn only_one_flush_runs_at_a_time() {
    let memory = Arc::new(MemoryBackend::new());
    let slow = Arc::new(SlowBackend {
        inner: memory.clone(),
        delay: Duration::from_millis(200),
    });
    let f = fixture_with(slow, memory);

    f.engine
        .enqueue(Record::new(RecordType::Quote, json!({"quoteNumber": "Q-1"})));
    f.engine
        .enqueue(Record::new(RecordType::Quote, json!({"quoteNumber": "Q-2"})));

    let (first, second) = tokio::join!(f.engine.sync_now(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.engine.is_syncing());
        f.engine
            .enqueue(Record::new(RecordType::Quote, json!({"quoteNumber": "Q-3"})));
        f.engine.sync_now().await
    });

    let first = first.expect("first flush runs");
    assert!(second.is_none(), "second flush must not start while one is in flight");
    assert_eq!(first.uploaded, 2);

    // Entries that arrived mid-flush are waiting for the next cycle
    assert_eq!(f.engine.pending(), 1);
    assert_eq!(f.engine.state(), SyncState::Accumulating);
    let next = f.engine.sync_now().await.unwrap();
    assert_eq!(next.uploaded, 1);
    assert_eq!(f.backend.rows("quotes").len(), 3);
}

#[tokio::test(start_paused = true)]
async fn document_writes_are_detected_and_uploaded() {
    let f = fixture();
    f.documents.create_database("PEBLGrantsBudgets", 6, &budget_schema());
    let store = f.engine.observed_document_store();
    let db = store.open("PEBLGrantsBudgets", 6).await.unwrap().unwrap();
    db.put(
        "projects",
        &json!({"id": 1, "projectName": "Coastal Survey", "projectNumber": "P-12", "total": 5000}),
    )
    .await
    .unwrap();

    let runner = Arc::clone(&f.engine);
    let handle = tokio::spawn(async move { runner.run().await });
    tokio::time::sleep(Duration::from_secs(3)).await;

    let rows = f.backend.rows("projects");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["project_name"], json!("Coastal Survey"));
    assert_eq!(rows[0]["budget_data"]["total"], json!(5000));

    f.engine.shutdown().await;
    handle.await.unwrap();
}

// =============================================================================
// Restore
// =============================================================================

#[tokio::test(start_paused = true)]
async fn restore_skipped_when_local_has_data() {
    let f = fixture();
    let user = user_id(&f.engine).await;
    let db = f.documents.create_database("PEBLGrantsBudgets", 6, &budget_schema());
    db.put("csvFiles", &json!({"fileName": "local.csv", "data": "a\n1"}))
        .await
        .unwrap();
    for name in ["A", "B", "C", "D"] {
        f.backend
            .insert_row("projects", owned(&user, json!({"project_name": name})));
    }

    let outcome = f.engine.check_and_restore().await.unwrap();
    assert_eq!(outcome, RestoreOutcome::NotNeeded);
    assert_eq!(db.len("projects"), 0);
}

#[tokio::test(start_paused = true)]
async fn restore_skipped_when_remote_is_empty() {
    let f = fixture();
    f.documents.create_database("PEBLGrantsBudgets", 6, &budget_schema());
    let outcome = f.engine.check_and_restore().await.unwrap();
    assert_eq!(outcome, RestoreOutcome::NotNeeded);
    assert!(!f
        .backend
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::SelectAll { .. })));
}

#[tokio::test(start_paused = true)]
async fn cleared_cache_restores_three_projects() {
    let f = fixture();
    let user = user_id(&f.engine).await;
    let db = f.documents.create_database("PEBLGrantsBudgets", 6, &budget_schema());
    for (id, name) in [(1, "Alpha"), (2, "Beta"), (3, "Gamma")] {
        f.backend.insert_row(
            "projects",
            owned(
                &user,
                json!({
                    "project_name": name,
                    "project_number": format!("P-{id}"),
                    "budget_data": {"id": id, "projectName": name, "lines": [id * 100]},
                    "last_modified": "2024-01-04T09:00:00Z"
                }),
            ),
        );
    }
    f.backend.insert_row(
        "transactions",
        owned(
            &user,
            json!({"date": "2024-01-05", "description": "Paint", "amount": -42.5,
                   "transaction_data": {"date": "05/01/2024", "description": "Paint", "spent": "£42.50"}}),
        ),
    );

    let outcome = f.engine.check_and_restore().await.unwrap();
    let RestoreOutcome::Complete(report) = outcome else {
        panic!("expected a complete restore, got {outcome:?}");
    };
    assert_eq!(report.restored_for(RecordType::Project), 3);
    assert_eq!(report.restored_for(RecordType::Transaction), 1);
    assert_eq!(report.total_restored(), 4);

    let projects = db.get_all("projects").await.unwrap();
    assert_eq!(projects.len(), 3);
    let beta = projects
        .iter()
        .find(|p| p["projectName"] == json!("Beta"))
        .unwrap();
    assert_eq!(beta["projectNumber"], json!("P-2"));
    assert_eq!(beta["lines"], json!([200]));

    let transactions: Value = serde_json::from_str(&f.key_values.get("transactions").unwrap()).unwrap();
    assert_eq!(transactions[0]["spent"], json!("£42.50"));

    // Restore writes bypass the observed stores, so nothing is queued
    assert_eq!(f.engine.pending(), 0);

    // Local data is back; the check no longer fires
    assert_eq!(f.engine.check_and_restore().await.unwrap(), RestoreOutcome::NotNeeded);
}

#[tokio::test(start_paused = true)]
async fn restored_blob_types_round_trip_their_content() {
    let f = fixture();
    let user = user_id(&f.engine).await;
    let db = f.documents.create_database("PEBLGrantsBudgets", 6, &budget_schema());
    let path = format!("{user}/scan.pdf");
    f.backend.insert_row("projects", owned(&user, json!({"project_name": "A"})));
    f.backend.insert_row(
        "invoices",
        owned(&user, json!({"filename": "scan.pdf", "file_path": path, "transaction_index": 4})),
    );
    f.backend.insert_blob("invoices", &path, vec![0x25, 0x50, 0x44, 0x46]);

    let outcome = f.engine.check_and_restore().await.unwrap();
    assert!(matches!(outcome, RestoreOutcome::Complete(_)));

    let invoices = db.get_all("invoices").await.unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0]["filename"], json!("scan.pdf"));
    assert_eq!(invoices[0]["transactionIndex"], json!(4));
    assert_eq!(invoices[0]["blob"], json!("JVBERg=="));
}

#[tokio::test(start_paused = true)]
async fn uploaded_data_restores_after_wipe() {
    let f = fixture();
    let db = f.documents.create_database("PEBLGrantsBudgets", 6, &budget_schema());
    db.put("projects", &json!({"id": 9, "projectName": "Reef"})).await.unwrap();
    f.key_values
        .set_item("clients", r#"[{"clientName":"Acme","organization":"Acme Ltd"}]"#)
        .await
        .unwrap();

    f.engine.queue_full_sync();
    let report = f.engine.sync_now().await.unwrap();
    assert_eq!(report.uploaded, 2);

    db.clear_rows();
    f.key_values.wipe();

    let outcome = f.engine.check_and_restore().await.unwrap();
    assert!(matches!(outcome, RestoreOutcome::Complete(_)));
    assert_eq!(db.len("projects"), 1);
    let clients: Value = serde_json::from_str(&f.key_values.get("clients").unwrap()).unwrap();
    assert_eq!(clients[0]["clientName"], json!("Acme"));
}
