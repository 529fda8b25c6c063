//! # Quarantine Store
//!
//! Content-addressed storage for withheld originals. The id is derived
//! from the content hash (`q_` plus its first 16 hex digits), so identical
//! bytes land on the same record no matter how often or from where they
//! are scanned: the second writer observes the existing record and reports
//! a cache hit instead of writing again.
//!
//! Records are immutable once written; only the retention sweep deletes.
//! Writes are atomic (temp file, fsync, rename), safe against concurrent
//! scans hitting the same hash: both compose the same record, and rename
//! makes one of them the no-op.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use warden_pipeline::{Decision, Finding, Redaction, SourceDescriptor};

use crate::fsutil;
use crate::{Result, StoreError};

/// One quarantined original plus everything a reviewer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    /// `q_` + first 16 hex digits of the content hash.
    pub id: String,
    /// Milliseconds since epoch at first quarantine.
    pub created_at: u64,
    /// Where the content came from.
    pub source: SourceDescriptor,
    /// Full hex SHA-256 of the original bytes.
    pub content_hash: String,
    /// The withheld original (lossy UTF-8 of the scanned bytes).
    pub original: String,
    /// Byte length of the original input.
    pub original_len: usize,
    /// Sanitized rendering at quarantine time.
    pub sanitized: String,
    /// Findings that led to the decision.
    pub findings: Vec<Finding>,
    /// Redaction counts.
    pub redactions: Vec<Redaction>,
    /// The decision (BLOCK, or WARN when policy quarantines warns).
    pub decision: Decision,
    /// Risk score at quarantine time.
    pub risk_score: f64,
    /// Policy snapshot id that produced the decision.
    pub policy_version: String,
}

/// Directory-backed quarantine store.
#[derive(Debug, Clone)]
pub struct QuarantineStore {
    dir: PathBuf,
}

/// Derive the quarantine id for a content hash.
pub fn quarantine_id(content_hash: &str) -> String {
    let prefix: String = content_hash.chars().take(16).collect();
    format!("q_{prefix}")
}

impl QuarantineStore {
    /// Open (and create) the store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Store a record unless one already exists for its hash.
    ///
    /// Returns `(id, cache_hit)`; on a cache hit the existing record is
    /// left untouched.
    pub fn store(&self, record: &QuarantineRecord) -> Result<(String, bool)> {
        let id = quarantine_id(&record.content_hash);
        let path = self.path_for(&id);
        if path.exists() {
            debug!(%id, "quarantine dedup hit");
            return Ok((id, true));
        }
        let mut record = record.clone();
        record.id = id.clone();
        fsutil::atomic_write_json(&path, &record)?;
        debug!(%id, decision = %record.decision, "quarantine record written");
        Ok((id, false))
    }

    /// Load a record by id.
    pub fn get(&self, id: &str) -> Result<QuarantineRecord> {
        validate_id(id)?;
        fsutil::read_json(&self.path_for(id))?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Whether a record exists for this content hash.
    pub fn contains_hash(&self, content_hash: &str) -> bool {
        self.path_for(&quarantine_id(content_hash)).exists()
    }

    /// Retention sweep: delete records older than `max_age_ms`.
    ///
    /// Returns how many records were removed.
    pub fn sweep_older_than(&self, max_age_ms: u64, now_ms: u64) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(record) = fsutil::read_json::<QuarantineRecord>(&path)? else {
                continue;
            };
            if now_ms.saturating_sub(record.created_at) > max_age_ms {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Ids come from clients; refuse anything that is not `q_<hex>` so a
/// crafted id can never traverse out of the store directory.
fn validate_id(id: &str) -> Result<()> {
    let ok = id
        .strip_prefix("q_")
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err(StoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use warden_pipeline::SourceDescriptor;

    fn record(hash: &str) -> QuarantineRecord {
        QuarantineRecord {
            id: String::new(),
            created_at: 1_000,
            source: SourceDescriptor::inline("req-1"),
            content_hash: hash.to_string(),
            original: "original text".into(),
            original_len: 13,
            sanitized: "sanitized text".into(),
            findings: vec![Finding::new("POLICY_OVERRIDE", 0.85)],
            redactions: Vec::new(),
            decision: Decision::Block,
            risk_score: 0.85,
            policy_version: "deadbeefdeadbeef".into(),
        }
    }

    #[test]
    fn test_id_derivation() {
        assert_eq!(
            quarantine_id("abcdef0123456789ffffffffffffffff"),
            "q_abcdef0123456789"
        );
    }

    #[test]
    fn test_store_and_get() {
        let dir = TempDir::new().unwrap();
        let store = QuarantineStore::open(dir.path()).unwrap();
        let (id, hit) = store.store(&record(&"ab".repeat(32))).unwrap();
        assert!(!hit);
        let loaded = store.get(&id).unwrap();
        assert_eq!(loaded.original, "original text");
        assert_eq!(loaded.id, id);
    }

    #[test]
    fn test_dedup_on_same_hash() {
        let dir = TempDir::new().unwrap();
        let store = QuarantineStore::open(dir.path()).unwrap();
        let rec = record(&"cd".repeat(32));
        let (id1, hit1) = store.store(&rec).unwrap();
        let (id2, hit2) = store.store(&rec).unwrap();
        assert_eq!(id1, id2);
        assert!(!hit1);
        assert!(hit2);
    }

    #[test]
    fn test_existing_record_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = QuarantineStore::open(dir.path()).unwrap();
        let rec = record(&"ef".repeat(32));
        let (id, _) = store.store(&rec).unwrap();

        let mut altered = rec.clone();
        altered.original = "tampered".into();
        store.store(&altered).unwrap();

        assert_eq!(store.get(&id).unwrap().original, "original text");
    }

    #[test]
    fn test_get_unknown_id() {
        let dir = TempDir::new().unwrap();
        let store = QuarantineStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.get("q_0123456789abcdef"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_malformed_id_rejected() {
        let dir = TempDir::new().unwrap();
        let store = QuarantineStore::open(dir.path()).unwrap();
        assert!(store.get("../../etc/passwd").is_err());
        assert!(store.get("q_..").is_err());
    }

    #[test]
    fn test_sweep_removes_only_old_records() {
        let dir = TempDir::new().unwrap();
        let store = QuarantineStore::open(dir.path()).unwrap();

        let mut old = record(&"11".repeat(32));
        old.created_at = 1_000;
        store.store(&old).unwrap();

        let mut fresh = record(&"22".repeat(32));
        fresh.created_at = 900_000;
        store.store(&fresh).unwrap();

        let removed = store.sweep_older_than(100_000, 1_000_000).unwrap();
        assert_eq!(removed, 1);
        assert!(store.contains_hash(&"22".repeat(32)));
        assert!(!store.contains_hash(&"11".repeat(32)));
    }
}
