//! # Audit Log
//!
//! Append-only JSONL at `<data-dir>/logs/audit.jsonl`, one record per
//! line. Appends are a single `write` on an `O_APPEND` descriptor; POSIX
//! guarantees such writes do not interleave up to `PIPE_BUF` bytes, so the
//! common case needs no locking. Oversized lines take an exclusive lock
//! for the duration of the one write.
//!
//! The log records outcomes, never content: hashes, codes, counts. A
//! record is written for every scan, including gate blocks and fail-closed
//! results.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use warden_pipeline::{Decision, Redaction, SourceDescriptor};

use crate::Result;

/// POSIX atomic-append bound.
const PIPE_BUF: usize = 4096;

/// One audit line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Milliseconds since epoch.
    pub ts: u64,
    /// Content origin.
    pub source: SourceDescriptor,
    /// Hex SHA-256 of the scanned bytes.
    pub content_hash: String,
    /// Risk score of the scan.
    pub risk_score: f64,
    /// Decision of the scan.
    pub decision: Decision,
    /// Ordered reason codes.
    pub reasons: Vec<String>,
    /// Policy snapshot id.
    pub policy_version: String,
    /// Whether quarantine dedup hit.
    pub cache_hit: bool,
    /// Quarantine handle when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarantine_id: Option<String>,
    /// Redaction counts keyed by kind label.
    pub redactions_summary: BTreeMap<String, usize>,
}

impl AuditRecord {
    /// Build the per-kind summary from redaction counts.
    pub fn summarize_redactions(redactions: &[Redaction]) -> BTreeMap<String, usize> {
        let mut summary = BTreeMap::new();
        for r in redactions {
            *summary.entry(r.kind.label().to_string()).or_insert(0) += r.count;
        }
        summary
    }
}

/// Append-only JSONL log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Open the log under `<data_dir>/logs/audit.jsonl`, creating parents.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref().join("logs");
        fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join("audit.jsonl"),
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as one line.
    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if line.len() > PIPE_BUF {
            // Past the atomic-append bound the kernel may split the write,
            // so hold the lock for this one line. Released on close.
            file.lock_exclusive()?;
        }
        file.write_all(&line)?;
        Ok(())
    }

    /// Read every record back, skipping blank lines.
    ///
    /// Intended for review tooling and tests, not the hot path.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use warden_pipeline::{SecretKind, SourceDescriptor};

    fn record(hash: &str, decision: Decision) -> AuditRecord {
        AuditRecord {
            ts: 42,
            source: SourceDescriptor::inline("req-1"),
            content_hash: hash.to_string(),
            risk_score: 0.9,
            decision,
            reasons: vec!["POLICY_OVERRIDE".into()],
            policy_version: "deadbeefdeadbeef".into(),
            cache_hit: false,
            quarantine_id: None,
            redactions_summary: BTreeMap::new(),
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        log.append(&record("aa", Decision::Block)).unwrap();
        log.append(&record("bb", Decision::Allow)).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content_hash, "aa");
        assert_eq!(records[1].decision, Decision::Allow);
    }

    #[test]
    fn test_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        log.append(&record("aa", Decision::Warn)).unwrap();
        log.append(&record("bb", Decision::Warn)).unwrap();

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
        for line in raw.lines() {
            serde_json::from_str::<AuditRecord>(line).unwrap();
        }
    }

    #[test]
    fn test_oversized_record_still_one_line() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        let mut rec = record("cc", Decision::Block);
        rec.reasons = (0..600).map(|i| format!("REASON_{i}")).collect();
        log.append(&rec).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reasons.len(), 600);
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_redaction_summary() {
        let redactions = vec![
            Redaction {
                kind: SecretKind::Jwt,
                count: 2,
            },
            Redaction {
                kind: SecretKind::PrivateKey,
                count: 1,
            },
        ];
        let summary = AuditRecord::summarize_redactions(&redactions);
        assert_eq!(summary["JWT"], 2);
        assert_eq!(summary["PRIVATE_KEY"], 1);
    }
}
