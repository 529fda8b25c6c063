//! Configuration types for the BridgeWarden gateway.
//!
//! Defaults are the safe ones: network disabled, approvals required,
//! balanced profile. The config is a plain JSON document so it can be
//! committed next to the data it governs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use warden_pipeline::{Profile, ScanLimits};

use crate::error::WardenError;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WardenConfig {
    /// Detection profile.
    pub profile: Profile,

    /// Root of the persisted state (quarantine, logs, approvals, repos).
    pub data_dir: PathBuf,

    /// Base directory the file fetcher is jailed to.
    pub base_dir: PathBuf,

    /// Approval policy and static allowlists.
    pub approvals: ApprovalPolicy,

    /// Network fetcher settings.
    pub network: NetworkConfig,

    /// Per-request resource limits.
    pub limits: LimitsConfig,
}

/// Approval requirements and static allowlists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalPolicy {
    /// Whether unknown sources require an approval before fetching.
    pub require_approval: bool,

    /// Domains allowed without an approval record. An entry also covers
    /// its subdomains.
    pub allowed_web_domains: Vec<String>,

    /// Repository URL prefixes allowed without an approval record.
    pub allowed_repo_urls: Vec<String>,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            require_approval: true,
            allowed_web_domains: Vec::new(),
            allowed_repo_urls: Vec::new(),
        }
    }
}

/// Network fetcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Master switch; off by default.
    pub enabled: bool,

    /// Per-request deadline in seconds.
    pub timeout_seconds: u64,

    /// Web fetch byte cap.
    pub web_max_bytes: usize,

    /// Repo archive byte cap.
    pub repo_max_bytes: usize,

    /// Per-file byte cap inside repo archives.
    pub repo_max_file_bytes: usize,

    /// File count cap inside repo archives.
    pub repo_max_files: usize,

    /// Hosts the web fetcher may contact without approval.
    pub allowed_web_hosts: Vec<String>,

    /// Hosts the repo fetcher may contact without approval.
    pub allowed_repo_hosts: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_seconds: 20,
            web_max_bytes: 2 * 1024 * 1024,
            repo_max_bytes: 64 * 1024 * 1024,
            repo_max_file_bytes: 1024 * 1024,
            repo_max_files: 2_000,
            allowed_web_hosts: Vec::new(),
            allowed_repo_hosts: Vec::new(),
        }
    }
}

/// Per-request resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Pipeline input byte cap.
    pub max_input_bytes: usize,

    /// Findings cap per scan.
    pub max_findings: usize,

    /// Soft wall-clock deadline for detection, in milliseconds.
    pub scan_deadline_ms: u64,

    /// Concurrent fetch cap; excess requests queue.
    pub max_concurrent_fetches: usize,

    /// Bytes of redacted original returned by quarantine retrieval.
    pub quarantine_excerpt_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 4 * 1024 * 1024,
            max_findings: 64,
            scan_deadline_ms: 2_000,
            max_concurrent_fetches: 4,
            quarantine_excerpt_bytes: 4_096,
        }
    }
}

impl WardenConfig {
    /// Load a config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WardenError> {
        let bytes = std::fs::read(path.as_ref())?;
        serde_json::from_slice(&bytes)
            .map_err(|e| WardenError::InvalidArguments(format!("config: {e}")))
    }

    /// A config rooted at one directory, convenient for tests and one-shot
    /// scans.
    pub fn rooted_at(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            data_dir: dir.join("warden-data"),
            base_dir: dir.to_path_buf(),
            ..Self::default()
        }
    }

    /// Pipeline limits derived from this config.
    pub fn scan_limits(&self) -> ScanLimits {
        ScanLimits {
            max_input_bytes: self.limits.max_input_bytes,
            max_findings: self.limits.max_findings,
            scan_deadline: Duration::from_millis(self.limits.scan_deadline_ms),
        }
    }

    /// Network deadline as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_safe() {
        let config = WardenConfig::default();
        assert!(!config.network.enabled);
        assert!(config.approvals.require_approval);
        assert_eq!(config.profile, Profile::Balanced);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: WardenConfig =
            serde_json::from_str(r#"{"profile":"strict","network":{"enabled":true}}"#).unwrap();
        assert_eq!(config.profile, Profile::Strict);
        assert!(config.network.enabled);
        assert_eq!(config.network.timeout_seconds, 20);
        assert!(config.approvals.require_approval);
    }

    #[test]
    fn test_roundtrip() {
        let config = WardenConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: WardenConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.limits.max_findings, config.limits.max_findings);
    }
}
