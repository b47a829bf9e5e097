// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy for the backup engine.
//!
//! None of these are fatal to the host application. Session errors disable
//! syncing, store errors read as "no local data", validation problems skip a
//! single record and transport errors fail a single queue entry.

use thiserror::Error;

use crate::record::RecordType;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The backend client was never published (or its channel closed).
    #[error("backend client unavailable, sync disabled")]
    AuthUnavailable,

    /// Sign-in (and sign-up, where attempted) failed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Local store missing, version-mismatched or timed out while opening.
    #[error("local store unavailable: {0}")]
    StoreUnavailable(String),

    /// A local read or write failed after the store was opened.
    #[error("local store error: {0}")]
    Local(String),

    /// A queued record lacks a field its remote row needs.
    #[error("{record_type} record missing required field '{field}'")]
    Validation {
        record_type: RecordType,
        field: &'static str,
    },

    /// Network or backend failure during upload/download.
    #[error("transport failure{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// One or more record types could not be restored.
    #[error("restore incomplete, failed types: {}", join_types(failed))]
    PartialRestore { failed: Vec<RecordType> },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn join_types(types: &[RecordType]) -> String {
    types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl SyncError {
    /// Convenience constructor for transport errors without an HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// True when the failure points at credentials rather than connectivity.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        match self {
            Self::AuthUnavailable | Self::AuthFailed(_) => true,
            Self::Transport { status: Some(401 | 403), .. } => true,
            Self::Transport { message, .. } => {
                let lower = message.to_lowercase();
                lower.contains("jwt") || lower.contains("unauthorized") || lower.contains("auth")
            }
            _ => false,
        }
    }

    /// True when the failure looks like a connectivity problem.
    #[must_use]
    pub fn is_network(&self) -> bool {
        match self {
            Self::Transport { status: None, message } => {
                let lower = message.to_lowercase();
                !self.is_auth()
                    && (lower.contains("network")
                        || lower.contains("connect")
                        || lower.contains("timed out")
                        || lower.contains("fetch"))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display_includes_status() {
        let err = SyncError::Transport {
            status: Some(500),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "transport failure (HTTP 500): boom");
        assert_eq!(SyncError::transport("boom").to_string(), "transport failure: boom");
    }

    #[test]
    fn test_auth_classification() {
        assert!(SyncError::AuthUnavailable.is_auth());
        assert!(SyncError::Transport { status: Some(401), message: String::new() }.is_auth());
        assert!(SyncError::transport("JWT expired").is_auth());
        assert!(!SyncError::transport("connection refused").is_auth());
    }

    #[test]
    fn test_network_classification() {
        assert!(SyncError::transport("error sending request: connect failed").is_network());
        assert!(!SyncError::Transport { status: Some(500), message: "network".into() }.is_network());
        assert!(!SyncError::transport("JWT expired").is_network());
    }

    #[test]
    fn test_partial_restore_lists_types() {
        let err = SyncError::PartialRestore {
            failed: vec![RecordType::Invoice, RecordType::CsvFile],
        };
        assert_eq!(err.to_string(), "restore incomplete, failed types: invoice, csv-file");
    }
}
