// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! User-visible backup status.
//!
//! The engine publishes a [`SyncStatus`] on a watch channel; the host renders
//! it however it likes (badge, toast, banner). Nothing here ever blocks a
//! local write.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::warn;

/// Indicator badge state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    /// Sync is off (disabled in config or no session)
    Disabled,
    Ready,
    Syncing,
    Success,
    /// Nothing backed up for too long
    Warning,
    Error,
}

impl Indicator {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disabled => "Backup off",
            Self::Ready => "Backup ready",
            Self::Syncing => "Backing up...",
            Self::Success => "Backed up",
            Self::Warning => "Backup delayed",
            Self::Error => "Backup FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Transient notification (toast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// Increments per notice so repeated identical messages are distinguishable
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub indicator: Indicator,
    /// Persistent failure banner, until dismissed or a flush succeeds
    pub banner: Option<String>,
    pub notice: Option<Notice>,
    pub last_sync: Option<DateTime<Utc>>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            indicator: Indicator::Ready,
            banner: None,
            notice: None,
            last_sync: None,
        }
    }
}

pub const AUTH_FAILURE_MESSAGE: &str =
    "BACKUP FAILED: not signed in to the backup service. Your changes are NOT being saved.";
pub const NETWORK_FAILURE_MESSAGE: &str = "BACKUP FAILED: network error. Check your internet connection.";

/// Banner text for a failed flush; auth problems outrank network ones.
#[must_use]
pub fn failure_message(failed: usize, auth_errors: usize, network_errors: usize) -> String {
    if auth_errors > 0 {
        AUTH_FAILURE_MESSAGE.to_string()
    } else if network_errors > 0 {
        NETWORK_FAILURE_MESSAGE.to_string()
    } else {
        format!("BACKUP FAILED: {failed} items not saved!")
    }
}

pub struct StatusBoard {
    tx: watch::Sender<SyncStatus>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SyncStatus::default());
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    pub fn set_indicator(&self, indicator: Indicator) {
        self.tx.send_if_modified(|s| {
            let changed = s.indicator != indicator;
            s.indicator = indicator;
            changed
        });
    }

    /// Sync could not start; surfaced persistently.
    pub fn disabled(&self, reason: &str) {
        self.tx.send_modify(|s| {
            s.indicator = Indicator::Disabled;
            s.banner = Some(format!("BACKUP NOT WORKING: {reason}"));
        });
    }

    pub fn flush_succeeded(&self, at: DateTime<Utc>, uploaded: usize, notify: bool) {
        self.tx.send_modify(|s| {
            s.indicator = Indicator::Success;
            s.banner = None;
            s.last_sync = Some(at);
            if notify && uploaded > 0 {
                let message = format!("Backed up {uploaded} item{}", if uploaded == 1 { "" } else { "s" });
                s.notice = Some(next_notice(s.notice.as_ref(), NoticeLevel::Success, message));
            }
        });
    }

    pub fn flush_failed(&self, failed: usize, auth_errors: usize, network_errors: usize) {
        let message = failure_message(failed, auth_errors, network_errors);
        self.tx.send_modify(|s| {
            s.indicator = Indicator::Error;
            s.banner = Some(message.clone());
            s.notice = Some(next_notice(s.notice.as_ref(), NoticeLevel::Error, message));
        });
    }

    /// Restore finished; failures are surfaced as a notice only.
    pub fn restore_finished(&self, restored: usize, failed_types: usize) {
        self.tx.send_modify(|s| {
            let (level, message) = if failed_types == 0 {
                (NoticeLevel::Success, format!("Restored {restored} records from backup"))
            } else {
                (
                    NoticeLevel::Error,
                    format!("Restore incomplete: {failed_types} data types could not be restored"),
                )
            };
            s.notice = Some(next_notice(s.notice.as_ref(), level, message));
        });
    }

    pub fn dismiss_banner(&self) {
        self.tx.send_if_modified(|s| s.banner.take().is_some());
    }

    /// Flip to warning when the last successful flush is older than
    /// `stale_after`. Returns true if the backup is stale.
    pub fn check_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        let stale = self
            .tx
            .borrow()
            .last_sync
            .is_some_and(|last| now - last > stale_after);
        if stale {
            warn!(stale_after_secs = stale_after.num_seconds(), "No backup within the stale window");
            self.tx.send_if_modified(|s| {
                let changed = !matches!(s.indicator, Indicator::Warning | Indicator::Error | Indicator::Disabled);
                if changed {
                    s.indicator = Indicator::Warning;
                }
                changed
            });
        }
        stale
    }
}

fn next_notice(previous: Option<&Notice>, level: NoticeLevel, message: String) -> Notice {
    Notice {
        level,
        message,
        seq: previous.map_or(1, |n| n.seq + 1),
    }
}
