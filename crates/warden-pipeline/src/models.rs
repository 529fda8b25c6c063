//! # Core Types for the Inspection Pipeline
//!
//! This module defines the data types shared by every pipeline stage and by
//! the callers that consume scan results: findings, redactions, source
//! descriptors, the three-way [`Decision`], and the externally visible
//! [`GuardResult`].
//!
//! ## Design Principles
//!
//! 1. **Stable wire shape** - every type derives Serde and is written into
//!    audit lines and quarantine records; field renames are breaking.
//! 2. **String reason codes** - findings carry codes from [`crate::codes`]
//!    rather than an enum, so rule packs can grow without schema changes.
//! 3. **Determinism first** - all collections preserve insertion order;
//!    nothing here depends on wall-clock time or randomness.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or validating a policy snapshot.
///
/// Scan-time failures never surface as errors: the pipeline fails closed
/// and reports `INTERNAL_ERROR` inside the result instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A rule matcher failed to compile.
    #[error("rule {code} failed to compile: {detail}")]
    RuleCompile {
        /// Reason code of the offending rule.
        code: String,
        /// Compiler diagnostic.
        detail: String,
    },

    /// The startup self-test found a matcher misbehaving.
    #[error("policy self-test failed: {detail}")]
    SelfTest {
        /// What the probe observed.
        detail: String,
    },
}

/// The policy decision for a piece of scanned content.
///
/// - `Allow`: content is safe to hand to the agent
/// - `Warn`: content is passed on with findings attached; review recommended
/// - `Block`: content is withheld; a quarantine record holds the original
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Content passed all checks under the active profile.
    Allow,
    /// Content is suspicious but under the block threshold.
    Warn,
    /// Content is withheld from the agent.
    Block,
}

impl Decision {
    /// Returns true for an Allow decision.
    #[inline]
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Returns true for a Warn decision.
    #[inline]
    pub fn is_warn(&self) -> bool {
        matches!(self, Decision::Warn)
    }

    /// Returns true for a Block decision.
    #[inline]
    pub fn is_block(&self) -> bool {
        matches!(self, Decision::Block)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allow => write!(f, "ALLOW"),
            Decision::Warn => write!(f, "WARN"),
            Decision::Block => write!(f, "BLOCK"),
        }
    }
}

/// A single detection result produced by a pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Stable reason code (see [`crate::codes`]).
    pub code: String,

    /// Byte span in the normalized text, when the finding is anchored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<(usize, usize)>,

    /// Contribution to the risk score, in (0, 1].
    pub weight: f64,
}

impl Finding {
    /// Create a finding without a span.
    pub fn new(code: impl Into<String>, weight: f64) -> Self {
        Self {
            code: code.into(),
            span: None,
            weight,
        }
    }

    /// Create a finding anchored to a byte span of the normalized text.
    pub fn with_span(code: impl Into<String>, weight: f64, start: usize, end: usize) -> Self {
        Self {
            code: code.into(),
            span: Some((start, end)),
            weight,
        }
    }
}

/// Categories of secrets the redactor masks.
///
/// Ordered by severity: a private key block is worse to leak than a bearer
/// header. [`SecretKind::weight`] feeds the `SECRET_FOUND` finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    /// PEM-framed private key block.
    PrivateKey,
    /// AWS-style access key id (`AKIA` prefix).
    AwsAccessKey,
    /// High-entropy token preceded by key-like context.
    GenericApiKey,
    /// JSON Web Token (three base64url segments).
    Jwt,
    /// Authorization header line carrying a bearer/basic credential.
    BearerHeader,
}

impl SecretKind {
    /// The label rendered into the `«REDACTED:...»` mask.
    pub fn label(&self) -> &'static str {
        match self {
            SecretKind::PrivateKey => "PRIVATE_KEY",
            SecretKind::AwsAccessKey => "AWS_ACCESS_KEY",
            SecretKind::GenericApiKey => "API_KEY",
            SecretKind::Jwt => "JWT",
            SecretKind::BearerHeader => "BEARER",
        }
    }

    /// Score weight of the strongest finding for this kind.
    pub fn weight(&self) -> f64 {
        match self {
            SecretKind::PrivateKey => 0.5,
            SecretKind::AwsAccessKey => 0.45,
            SecretKind::GenericApiKey => 0.4,
            SecretKind::Jwt => 0.35,
            SecretKind::BearerHeader => 0.3,
        }
    }
}

/// Count of masked secrets of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redaction {
    /// Which secret category was masked.
    pub kind: SecretKind,
    /// How many occurrences were replaced.
    pub count: usize,
}

/// Where scanned content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Local file under the configured base directory.
    File,
    /// Document fetched over HTTP(S).
    Web,
    /// File extracted from a repository archive.
    Repo,
    /// Bytes handed to the pipeline directly (tests, one-shot scans).
    Inline,
}

/// Descriptor attached to every scan, identifying the content origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Origin category.
    pub kind: SourceKind,

    /// Fetched URL, for web and repo sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Relative path, for file and repo sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Host component, for web sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Correlation id for the request that triggered the scan.
    pub request_id: String,
}

impl SourceDescriptor {
    /// Descriptor for a local file read.
    pub fn file(path: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::File,
            url: None,
            path: Some(path.into()),
            domain: None,
            request_id: request_id.into(),
        }
    }

    /// Descriptor for a web fetch.
    pub fn web(
        url: impl Into<String>,
        domain: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: SourceKind::Web,
            url: Some(url.into()),
            path: None,
            domain: Some(domain.into()),
            request_id: request_id.into(),
        }
    }

    /// Descriptor for one file inside a fetched repository.
    pub fn repo(
        url: impl Into<String>,
        path: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: SourceKind::Repo,
            url: Some(url.into()),
            path: Some(path.into()),
            domain: None,
            request_id: request_id.into(),
        }
    }

    /// Descriptor for directly supplied bytes.
    pub fn inline(request_id: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Inline,
            url: None,
            path: None,
            domain: None,
            request_id: request_id.into(),
        }
    }
}

/// The externally visible outcome of guarding one piece of content.
///
/// Everything a client needs to act on: the decision, the sanitized
/// rendering, the stable content hash for dedup, and on BLOCK the handle
/// through which a reviewer can inspect the withheld original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardResult {
    /// Policy decision under the active profile.
    pub decision: Decision,

    /// Aggregated risk in [0, 1], rounded to four decimal places.
    pub risk_score: f64,

    /// Ordered, duplicate-free reason codes.
    pub reasons: Vec<String>,

    /// Content origin.
    pub source: SourceDescriptor,

    /// Hex SHA-256 of the pre-normalization input bytes.
    pub content_hash: String,

    /// Inert rendering of the content. Empty when policy hides it.
    pub sanitized_text: String,

    /// Quarantine handle, present on BLOCK when bytes were scanned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarantine_id: Option<String>,

    /// Per-kind counts of masked secrets.
    pub redactions: Vec<Redaction>,

    /// True when an identical input already had a quarantine record.
    pub cache_hit: bool,

    /// Identifier of the policy snapshot that produced this result.
    pub policy_version: String,

    /// Approval handle, present when the block requires a source approval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
}
