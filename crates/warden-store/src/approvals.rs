//! # Approvals Store
//!
//! Per-source approval records, one JSON file per id. An approval moves
//! PENDING -> APPROVED or PENDING -> DENIED exactly once; the transition
//! runs as read-validate-write-rename under an exclusive lock on a sidecar
//! lock file, so two concurrent deciders cannot both win.
//!
//! Listing is a directory scan with in-memory filtering, sorted by
//! `created_at` descending. Volumes here are human-scale (a reviewer works
//! the queue), so a scan is the right complexity.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::fsutil;
use crate::{now_millis, Result, StoreError};

/// What kind of source an approval covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    /// A web host.
    WebDomain,
    /// A repository URL.
    RepoUrl,
    /// An upstream MCP server.
    UpstreamMcpServer,
}

/// Lifecycle state of an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    /// Awaiting a human decision.
    Pending,
    /// Source approved for future fetches.
    Approved,
    /// Source denied.
    Denied,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "PENDING"),
            ApprovalStatus::Approved => write!(f, "APPROVED"),
            ApprovalStatus::Denied => write!(f, "DENIED"),
        }
    }
}

/// One approval request and its decision state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// Stable id (`apr_` + UUID).
    pub approval_id: String,
    /// Source category.
    pub kind: ApprovalKind,
    /// The host or URL being approved.
    pub target: String,
    /// Current lifecycle state.
    pub status: ApprovalStatus,
    /// Milliseconds since epoch at creation.
    pub created_at: u64,
    /// Milliseconds since epoch at decision, once decided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<u64>,
    /// Who decided, once decided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    /// Free-form reviewer notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Directory-backed approvals store.
#[derive(Debug, Clone)]
pub struct ApprovalStore {
    dir: PathBuf,
}

impl ApprovalStore {
    /// Open (and create) the store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn lock_path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.lock"))
    }

    /// Request approval for a source, reusing a matching PENDING record.
    pub fn request(&self, kind: ApprovalKind, target: &str) -> Result<ApprovalRecord> {
        if let Some(existing) = self.find(kind, target, Some(ApprovalStatus::Pending))? {
            return Ok(existing);
        }
        let record = ApprovalRecord {
            approval_id: format!("apr_{}", Uuid::new_v4()),
            kind,
            target: target.to_string(),
            status: ApprovalStatus::Pending,
            created_at: now_millis(),
            decided_at: None,
            decided_by: None,
            notes: None,
        };
        fsutil::atomic_write_json(&self.path_for(&record.approval_id), &record)?;
        info!(id = %record.approval_id, target, "approval requested");
        Ok(record)
    }

    /// Load one approval by id.
    pub fn get(&self, id: &str) -> Result<ApprovalRecord> {
        validate_id(id)?;
        fsutil::read_json(&self.path_for(id))?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Decide a PENDING approval. Fails on records already decided.
    pub fn decide(
        &self,
        id: &str,
        approve: bool,
        decided_by: Option<String>,
        notes: Option<String>,
    ) -> Result<ApprovalRecord> {
        validate_id(id)?;

        // The sidecar lock serializes the read-modify-write; the record
        // file itself is replaced by rename, which would detach a lock
        // held on it.
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.lock_path_for(id))?;
        lock_file.lock_exclusive()?;

        let result = (|| {
            let mut record = self.get(id)?;
            if record.status != ApprovalStatus::Pending {
                return Err(StoreError::AlreadyDecided {
                    id: id.to_string(),
                    status: record.status.to_string(),
                });
            }
            record.status = if approve {
                ApprovalStatus::Approved
            } else {
                ApprovalStatus::Denied
            };
            record.decided_at = Some(now_millis());
            record.decided_by = decided_by;
            record.notes = notes;
            fsutil::atomic_write_json(&self.path_for(id), &record)?;
            info!(%id, status = %record.status, "approval decided");
            Ok(record)
        })();

        let _ = fs2::FileExt::unlock(&lock_file);
        result
    }

    /// List approvals, newest first, with optional filters.
    pub fn list(
        &self,
        status: Option<ApprovalStatus>,
        kind: Option<ApprovalKind>,
        limit: Option<usize>,
    ) -> Result<Vec<ApprovalRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(record) = fsutil::read_json::<ApprovalRecord>(&path)? else {
                continue;
            };
            if status.is_some_and(|s| record.status != s) {
                continue;
            }
            if kind.is_some_and(|k| record.kind != k) {
                continue;
            }
            records.push(record);
        }
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.approval_id.cmp(&b.approval_id))
        });
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Whether an APPROVED record exists for this target.
    pub fn is_approved(&self, kind: ApprovalKind, target: &str) -> Result<bool> {
        Ok(self
            .find(kind, target, Some(ApprovalStatus::Approved))?
            .is_some())
    }

    fn find(
        &self,
        kind: ApprovalKind,
        target: &str,
        status: Option<ApprovalStatus>,
    ) -> Result<Option<ApprovalRecord>> {
        Ok(self
            .list(status, Some(kind), None)?
            .into_iter()
            .find(|r| r.target == target))
    }
}

/// Ids come from clients; refuse anything that could traverse out of the
/// store directory.
fn validate_id(id: &str) -> Result<()> {
    let ok = id
        .strip_prefix("apr_")
        .map(|rest| {
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err(StoreError::NotFound(id.to_string()))
    }
}
