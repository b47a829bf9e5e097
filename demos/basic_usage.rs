// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic backup-sync usage example.
//!
//! Demonstrates, entirely in memory:
//! 1. Starting the engine with an anonymous device session
//! 2. Writing a project and a burst of transaction edits through the observed stores
//! 3. Watching the debounced flush upload them
//! 4. Clearing local storage and restoring from the backend
//! 5. Displaying the captured metrics
//! 6. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;

use backup_sync::clock::SystemClock;
use backup_sync::session::{SessionPolicy, SessionProvider};
use backup_sync::storage::memory::{MemoryAuth, MemoryBackend, MemoryDocumentStore, MemoryKeyValueStore};
use backup_sync::{DocumentStore, KeyValueStore, RestoreOutcome, SyncConfig, SyncEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("backup_sync=info")),
        )
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║            backup-sync: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Wire up stores, backend and session
    // ─────────────────────────────────────────────────────────────────────────
    let documents = Arc::new(MemoryDocumentStore::new());
    let key_values = Arc::new(MemoryKeyValueStore::new());
    let backend = Arc::new(MemoryBackend::new());
    let budgets = documents.create_database(
        "PEBLGrantsBudgets",
        6,
        &[("projects", Some("id")), ("csvFiles", Some("fileName")), ("invoices", Some("filename"))],
    );

    let session = SessionProvider::ready(
        Arc::new(MemoryAuth::new()),
        SessionPolicy::anonymous("devices.example.org"),
        key_values.clone(),
        Arc::new(SystemClock),
    );
    let config = SyncConfig {
        debounce_ms: 500,
        ..SyncConfig::default()
    };
    let engine = Arc::new(SyncEngine::new(
        config,
        Arc::new(session),
        documents.clone(),
        key_values.clone(),
        backend.clone(),
    ));

    println!("🚀 Starting engine...");
    let restore = engine.start().await?;
    println!("   └─ Startup restore check: {restore:?}");
    println!("   └─ Status: {}", engine.status().indicator.label());

    let runner = Arc::clone(&engine);
    let loop_handle = tokio::spawn(async move { runner.run().await });

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Write through the observed stores
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Writing local data...");
    let docs = engine.observed_document_store();
    let kv = engine.observed_key_value_store();

    if let Some(db) = docs.open("PEBLGrantsBudgets", 6).await? {
        db.put(
            "projects",
            &json!({"id": 1, "projectName": "Coastal Survey", "projectNumber": "P-12", "budget": 48000}),
        )
        .await?;
        println!("   └─ Project 'Coastal Survey' saved");
    }

    for spent in ["£40.00", "£42.00", "£42.50"] {
        let transactions = json!([
            {"date": "05/01/2024", "description": "Paint", "spent": spent},
            {"date": "06/01/2024", "description": "Grant instalment", "received": "£1,200"}
        ]);
        kv.set_item("transactions", &transactions.to_string()).await?;
        println!("   └─ Transactions saved (paint: {spent})");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Let the quiet period elapse
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n⏳ Waiting for the debounced flush...");
    tokio::time::sleep(Duration::from_secs(1)).await;

    println!("   ┌─ Remote tables");
    for table in ["projects", "transactions"] {
        for row in backend.rows(table) {
            let label = row
                .get("project_name")
                .or_else(|| row.get("description"))
                .cloned()
                .unwrap_or_default();
            println!("   │  └─ {table}: {label} (amount: {})", row.get("amount").cloned().unwrap_or_default());
        }
    }
    println!("   └─ Last sync: {:?}", engine.last_sync_time());

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Simulate a cleared browser cache and restore
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🧹 Clearing local storage...");
    budgets.clear_rows();
    key_values.wipe();

    println!("♻️  Checking for cache clear...");
    match engine.check_and_restore().await? {
        RestoreOutcome::NotNeeded => println!("   └─ Nothing to restore"),
        RestoreOutcome::Complete(report) => {
            println!("   └─ Restored {} records", report.total_restored());
            for (record_type, count) in &report.restored {
                println!("      └─ {record_type}: {count}");
            }
        }
        RestoreOutcome::Partial(report) => {
            println!("   └─ Partial restore ({} records)", report.total_restored());
            for failure in &report.failures {
                println!("      └─ {} failed: {}", failure.record_type, failure.error);
            }
        }
    }
    println!("   └─ Local projects: {}", budgets.len("projects"));
    println!(
        "   └─ Local transactions: {}",
        key_values.get("transactions").unwrap_or_else(|| "(none)".into())
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Captured metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    engine.shutdown().await;
    loop_handle.await?;
    println!("   ✅ Shutdown complete! State: {:?}", engine.state());

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Print every captured metric, grouped by kind.
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut counters = Vec::new();
    let mut gauges = Vec::new();
    let mut histograms = Vec::new();

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", labels.join(","))
        };
        let name = format!("{}{}", key.name(), label_str);

        match value {
            DebugValue::Counter(v) => counters.push((name, v)),
            DebugValue::Gauge(v) => gauges.push((name, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, count, sum));
            }
        }
    }

    counters.sort();
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    println!("   ┌─ Counters");
    for (name, value) in &counters {
        println!("   │  └─ {name} = {value}");
    }
    println!("   ├─ Gauges");
    for (name, value) in &gauges {
        println!("   │  └─ {name} = {value:.2}");
    }
    println!("   └─ Histograms");
    for (name, count, sum) in &histograms {
        println!("      └─ {name}: count={count} sum={sum:.4}");
    }
}
