//! # Policy Snapshot
//!
//! A [`PolicySnapshot`] is the compiled, immutable form of everything a
//! scan depends on: the profile, the compiled rule packs, the secret
//! patterns, and the resource limits. Servers load one snapshot at start
//! (and on SIGHUP) and thread an `Arc` through each request; in-flight
//! scans keep the snapshot they began with, so a reload never changes a
//! result mid-scan.
//!
//! The snapshot id (`policy_version`) is the first 16 hex digits of
//! SHA-256 over the rule pack version, the profile name and the canonical
//! redaction config. Identical bytes scanned under the same version are
//! guaranteed identical results, which is what makes quarantine dedup and
//! audit correlation sound.

use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::decide::Profile;
use crate::detect::Detector;
use crate::models::PipelineError;
use crate::normalize;
use crate::packs::RULE_PACK_VERSION;
use crate::redact::{RedactionConfig, RedactionEngine};

/// Per-scan resource limits.
#[derive(Debug, Clone, Copy)]
pub struct ScanLimits {
    /// Input bytes processed; anything beyond is dropped with `SIZE_EXCEEDED`.
    pub max_input_bytes: usize,
    /// Findings cap; collection stops with `RULE_LIMIT_REACHED`.
    pub max_findings: usize,
    /// Soft wall-clock deadline for the detection stage.
    pub scan_deadline: Duration,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: 4 * 1024 * 1024,
            max_findings: 64,
            scan_deadline: Duration::from_millis(2_000),
        }
    }
}

/// Compiled policy: profile, rule packs, redaction patterns, limits.
pub struct PolicySnapshot {
    /// Active detection profile.
    pub profile: Profile,
    /// Snapshot id, stable across runs for identical inputs.
    pub version: String,
    /// Per-scan resource limits.
    pub limits: ScanLimits,
    pub(crate) detector: Detector,
    redactor: RedactionEngine,
}

impl PolicySnapshot {
    /// Compile a snapshot and run the matcher self-test.
    pub fn load(
        profile: Profile,
        redaction: RedactionConfig,
        limits: ScanLimits,
    ) -> Result<Self, PipelineError> {
        let detector = Detector::compile(profile)?;
        let redactor = RedactionEngine::new(&redaction)?;
        let version = policy_version(profile, &redaction);
        let snapshot = Self {
            profile,
            version,
            limits,
            detector,
            redactor,
        };
        snapshot.self_test()?;
        Ok(snapshot)
    }

    /// Compile a snapshot with default redaction and limits.
    pub fn load_default(profile: Profile) -> Result<Self, PipelineError> {
        Self::load(profile, RedactionConfig::default(), ScanLimits::default())
    }

    /// The compiled secret scanner, shared with quarantine retrieval.
    pub fn redactor(&self) -> &RedactionEngine {
        &self.redactor
    }

    /// Probe every compiled matcher with adversarial inputs.
    ///
    /// The regex engine is linear-time by construction, so this is a belt
    /// and braces check that a pack edit has not introduced a matcher that
    /// is merely slow at scale (huge alternations, pathological phrase
    /// automata).
    fn self_test(&self) -> Result<(), PipelineError> {
        let probes = [
            "a".repeat(64 * 1024),
            "ignore ignore ignore ".repeat(3_000),
            "-----BEGIN ".repeat(5_000),
            "\u{200B}".repeat(20_000),
            "((((([[[[[".repeat(5_000),
        ];
        let budget = Duration::from_secs(2);
        for probe in &probes {
            let started = Instant::now();
            let n = normalize::normalize(probe.as_bytes());
            let mut findings = Vec::new();
            self.detector.scan(
                &n.text,
                &n.shadow,
                &mut findings,
                self.limits.max_findings,
                Some(started + budget),
            );
            let _ = self.redactor.redact(&n.text);
            if started.elapsed() > budget {
                return Err(PipelineError::SelfTest {
                    detail: format!(
                        "matcher probe took {:?} on {} bytes",
                        started.elapsed(),
                        probe.len()
                    ),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for PolicySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicySnapshot")
            .field("profile", &self.profile)
            .field("version", &self.version)
            .finish()
    }
}

/// Hash the policy inputs into a stable snapshot id.
fn policy_version(profile: Profile, redaction: &RedactionConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(RULE_PACK_VERSION.as_bytes());
    hasher.update(b"|");
    hasher.update(profile.name().as_bytes());
    hasher.update(b"|");
    // serde_json keeps struct field order, so this is canonical enough for
    // a config struct we own.
    hasher.update(serde_json::to_vec(redaction).expect("redaction config serializes"));
    let digest = hasher.finalize();
    hex(&digest)[..16].to_string()
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
