//! # Warden Store - Persistence Layer
//!
//! File-backed stores shared by every concurrent scan:
//!
//! | Store | Layout | Write discipline |
//! |-------|--------|------------------|
//! | [`QuarantineStore`] | `quarantine/<id>.json` | temp file + fsync + rename, idempotent per content hash |
//! | [`AuditLog`] | `logs/audit.jsonl` | one `write` per line, `O_APPEND`; exclusive lock for oversized lines |
//! | [`ApprovalStore`] | `approvals/<id>.json` | read-modify-write under an exclusive sidecar lock |
//!
//! All records are plain JSON so a reviewer can inspect the data directory
//! with nothing but a pager. Original untrusted text lives only inside
//! quarantine records; the audit log never carries it.

pub mod approvals;
pub mod audit;
pub mod fsutil;
pub mod quarantine;

pub use approvals::{ApprovalKind, ApprovalRecord, ApprovalStatus, ApprovalStore};
pub use audit::{AuditLog, AuditRecord};
pub use quarantine::{QuarantineRecord, QuarantineStore};

use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed to (de)serialize.
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Record not found.
    #[error("record not found: {0}")]
    NotFound(String),

    /// An approval was asked to leave a terminal state.
    #[error("approval {id} already decided: {status}")]
    AlreadyDecided {
        /// Approval id.
        id: String,
        /// Current terminal status.
        status: String,
    },
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
