//! # BridgeWarden Core
//!
//! Unified gateway facade between an AI coding agent and untrusted
//! content. Orchestrates the fetchers, the inspection pipeline and the
//! stores behind the eight `bw_*` tools.
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          WARDEN CORE                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   tool call ──▶ gates ──▶ fetcher ──▶ pipeline ──▶ GuardResult   │
//! │                   │          │            │                      │
//! │                   │          │            ├─▶ Quarantine (BLOCK) │
//! │                   │          │            └─▶ AuditLog (always)  │
//! │                   │          └── warden-fetch                    │
//! │                   └── approvals / allowlists / SSRF              │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Notes
//!
//! - Gates run before any byte of untrusted content is fetched.
//! - The pipeline is fail-closed; errors produce BLOCK, not Allow.
//! - Every scan outcome is audited exactly once; originals never reach
//!   the audit log.
//! - A byte that entered the pipeline either emerges sanitized, or does
//!   not emerge.

mod config;
mod error;
mod warden;

pub use config::{ApprovalPolicy, LimitsConfig, NetworkConfig, WardenConfig};
pub use error::WardenError;
pub use warden::{
    QuarantineMeta, QuarantineView, RepoFetchReport, RepoFetchRequest, RepoFileFinding,
    RepoSummary, Warden,
};

// Re-export component types callers need alongside the facade.
pub use warden_fetch::FetchMode;
pub use warden_pipeline::{
    codes, Decision, Finding, GuardResult, Profile, Redaction, SecretKind, SourceDescriptor,
    SourceKind,
};
pub use warden_store::{ApprovalKind, ApprovalRecord, ApprovalStatus};

/// Core result type for gateway operations.
pub type Result<T> = std::result::Result<T, WardenError>;
