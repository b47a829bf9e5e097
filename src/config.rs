// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the backup engine.
//!
//! # Example
//!
//! ```
//! use backup_sync::SyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SyncConfig::default();
//! assert_eq!(config.debounce_ms, 2000);
//! assert_eq!(config.retry_attempts, 3);
//!
//! // Tuned config
//! let config = SyncConfig {
//!     debounce_ms: 500,
//!     verbose: true,
//!     ..Default::default()
//! };
//! assert!(config.enabled);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::resilience::retry::RetryConfig;

/// Static configuration for the backup engine.
///
/// All fields have defaults matching the original browser deployment.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Master switch. When false the engine never signs in or uploads.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period after the last change before a flush (default: 2s)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Upload attempts per queue entry before it is abandoned for the cycle
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    /// Fixed delay between attempts (default: 5s)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Bound on opening a local database (default: 3s)
    #[serde(default = "default_store_open_timeout_ms")]
    pub store_open_timeout_ms: u64,

    /// Bound on waiting for the backend client to be published (default: 30s).
    /// Applied to the session provider when the engine is built.
    #[serde(default = "default_client_ready_timeout_ms")]
    pub client_ready_timeout_ms: u64,

    /// Check for a wiped local store once at startup
    #[serde(default = "default_true")]
    pub auto_restore: bool,

    /// Emit success notifications (failures are always surfaced)
    #[serde(default = "default_true")]
    pub show_notifications: bool,

    /// Log per-entry activity at info instead of debug
    #[serde(default)]
    pub verbose: bool,

    /// Periodic full sync while idle, in seconds (0 = disabled)
    #[serde(default = "default_full_sync_interval_secs")]
    pub full_sync_interval_secs: u64,

    /// Health check cadence, in seconds (0 = disabled)
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,

    /// No successful flush for this long flips the indicator to warning
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_true() -> bool { true }
fn default_debounce_ms() -> u64 { 2000 }
fn default_retry_attempts() -> usize { 3 }
fn default_retry_delay_ms() -> u64 { 5000 }
fn default_store_open_timeout_ms() -> u64 { 3000 }
fn default_client_ready_timeout_ms() -> u64 { 30_000 }
fn default_full_sync_interval_secs() -> u64 { 300 } // 5 minutes
fn default_health_check_interval_secs() -> u64 { 60 }
fn default_stale_after_secs() -> u64 { 600 } // 10 minutes

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            debounce_ms: default_debounce_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            store_open_timeout_ms: default_store_open_timeout_ms(),
            client_ready_timeout_ms: default_client_ready_timeout_ms(),
            auto_restore: default_true(),
            show_notifications: default_true(),
            verbose: false,
            full_sync_interval_secs: default_full_sync_interval_secs(),
            health_check_interval_secs: default_health_check_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn store_open_timeout(&self) -> Duration {
        Duration::from_millis(self.store_open_timeout_ms)
    }

    #[must_use]
    pub fn client_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.client_ready_timeout_ms)
    }

    /// Retry policy for a single queue entry.
    #[must_use]
    pub fn upload_retry(&self) -> RetryConfig {
        RetryConfig::fixed(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}
