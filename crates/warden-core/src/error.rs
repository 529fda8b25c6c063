//! Error taxonomy for the gateway facade.
//!
//! Only *bad input* surfaces as an error to the RPC layer; everything that
//! is a policy outcome (SSRF, missing approvals, fetch failures, internal
//! pipeline faults) is folded into a BLOCK GuardResult instead. See the
//! `rpc_code` mapping for the reserved range `[-32099, -32000]`.

use thiserror::Error;

use warden_pipeline::PipelineError;
use warden_store::StoreError;

/// Gateway errors that abort a request before or instead of a scan.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Requested path escapes the configured base directory.
    #[error("path escapes base directory: {0}")]
    PathEscape(String),

    /// Unknown tool name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments failed to parse or validate.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Network fetchers are disabled by configuration.
    #[error("network access is disabled")]
    NetworkDisabled,

    /// Referenced record or file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Approval is already in a terminal state.
    #[error("approval already decided: {0}")]
    AlreadyDecided(String),

    /// Policy snapshot failed to compile or self-test.
    #[error("policy error: {0}")]
    Policy(#[from] PipelineError),

    /// Filesystem failure outside the pipeline.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else; fail-closed paths report this.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// JSON-RPC error code in the server-reserved range.
    pub fn rpc_code(&self) -> i64 {
        match self {
            WardenError::PathEscape(_) => -32001,
            WardenError::UnknownTool(_) => -32002,
            WardenError::InvalidArguments(_) => -32003,
            WardenError::NetworkDisabled => -32004,
            WardenError::NotFound(_) => -32005,
            WardenError::AlreadyDecided(_) => -32006,
            WardenError::Policy(_) | WardenError::Io(_) | WardenError::Internal(_) => -32000,
        }
    }
}

impl From<StoreError> for WardenError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => WardenError::NotFound(id),
            StoreError::AlreadyDecided { id, status } => {
                WardenError::AlreadyDecided(format!("{id} is {status}"))
            }
            other => WardenError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_codes_in_reserved_range() {
        let errors = [
            WardenError::PathEscape("x".into()),
            WardenError::UnknownTool("x".into()),
            WardenError::InvalidArguments("x".into()),
            WardenError::NetworkDisabled,
            WardenError::NotFound("x".into()),
            WardenError::AlreadyDecided("x".into()),
            WardenError::Internal("x".into()),
        ];
        for err in errors {
            let code = err.rpc_code();
            assert!((-32099..=-32000).contains(&code), "{err}: {code}");
        }
    }

    #[test]
    fn test_store_error_mapping() {
        let err: WardenError = StoreError::NotFound("q_ab".into()).into();
        assert!(matches!(err, WardenError::NotFound(_)));
        assert_eq!(err.rpc_code(), -32005);
    }
}
