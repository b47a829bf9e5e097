// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Deduplicating sync queue.
//!
//! The [`SyncQueue`] holds pending records keyed by `(type, natural key)`.
//! Re-enqueueing a key replaces the payload but keeps the original position,
//! so the latest value wins without reordering the flush.
//!
//! # Example
//!
//! ```
//! use backup_sync::queue::SyncQueue;
//! use backup_sync::{Record, RecordType};
//! use serde_json::json;
//!
//! let mut queue = SyncQueue::new();
//! queue.push(Record::new(RecordType::Project, json!({"projectName": "Kelp", "v": 1})));
//! queue.push(Record::new(RecordType::Project, json!({"projectName": "Reef"})));
//! queue.push(Record::new(RecordType::Project, json!({"projectName": "Kelp", "v": 2})));
//! assert_eq!(queue.len(), 2);
//!
//! let batch = queue.take();
//! assert!(queue.is_empty());
//! assert_eq!(batch.len(), 2);
//! ```

use std::collections::HashMap;

use crate::descriptor::descriptor;
use crate::record::{Record, RecordType};

/// Why a flush started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Debounce deadline elapsed
    Debounce,
    /// `sync_now()` collapsed the deadline
    Manual,
    /// Periodic full sync while idle
    Periodic,
    /// Final flush on shutdown
    Shutdown,
}

/// Identity of a queue slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Record { record_type: RecordType, key: String },
    Full,
}

/// One pending unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEntry {
    Record(Record),
    /// Scan every local collection and key, skipping what this session already uploaded
    FullSync,
}

impl QueueEntry {
    #[must_use]
    pub fn key(&self) -> EntryKey {
        match self {
            Self::Record(record) => EntryKey::Record {
                record_type: record.record_type,
                key: descriptor(record.record_type).dedup_key(record),
            },
            Self::FullSync => EntryKey::Full,
        }
    }

    fn size_bytes(&self) -> usize {
        match self {
            Self::Record(record) => record.size_bytes(),
            Self::FullSync => 0,
        }
    }
}

/// Ordered, key-deduplicated pending set.
#[derive(Debug, Default)]
pub struct SyncQueue {
    entries: Vec<QueueEntry>,
    index: HashMap<EntryKey, usize>,
    total_bytes: usize,
}

impl SyncQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace in place. Returns true if the key was new.
    pub fn push(&mut self, record: Record) -> bool {
        self.push_entry(QueueEntry::Record(record))
    }

    /// Request a full scan (at most one marker is ever pending).
    pub fn push_full(&mut self) -> bool {
        self.push_entry(QueueEntry::FullSync)
    }

    pub fn push_entry(&mut self, entry: QueueEntry) -> bool {
        let key = entry.key();
        let size = entry.size_bytes();
        match self.index.get(&key) {
            Some(&pos) => {
                self.total_bytes = self.total_bytes - self.entries[pos].size_bytes() + size;
                self.entries[pos] = entry;
                false
            }
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(entry);
                self.total_bytes += size;
                true
            }
        }
    }

    /// Snapshot and clear.
    pub fn take(&mut self) -> Vec<QueueEntry> {
        self.index.clear();
        self.total_bytes = 0;
        std::mem::take(&mut self.entries)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate payload bytes pending.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}
