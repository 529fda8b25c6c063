//! # Warden Fetch - Guarded Content Acquisition
//!
//! The only I/O in the system lives here. Three fetchers feed bytes to the
//! inspection pipeline, each enforcing its contract before a single
//! untrusted byte is buffered:
//!
//! | Fetcher | Guards |
//! |---------|--------|
//! | [`FileFetcher`] | base-directory jail (`..` and symlink escapes), byte cap |
//! | [`WebFetcher`] | scheme allowlist, SSRF address checks, per-hop redirect re-checks, byte cap, deadline |
//! | [`RepoFetcher`] | HTTPS only, archive/file/count caps, path filters |
//!
//! Fetchers return raw bytes plus enough source metadata for attribution;
//! they never interpret content. Policy decisions (allowlists, approvals)
//! belong to the caller; the address-level SSRF guard lives here because
//! every hop of every request must pass it, including redirects.

pub mod file;
pub mod repo;
pub mod ssrf;
pub mod web;

pub use file::FileFetcher;
pub use repo::{RepoCaps, RepoFetcher, RepoFile};
pub use web::{FetchMode, FetchedDoc, WebFetcher};

use thiserror::Error;

/// Errors surfaced by the fetchers.
///
/// The caller maps these onto policy outcomes: address violations become
/// `SSRF_BLOCKED`, caps become `SIZE_EXCEEDED`, transport failures become
/// `FETCH_FAILED`, and path escapes are request errors that never start a
/// scan.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Path points outside the configured base directory.
    #[error("path escapes base directory: {path}")]
    PathEscape {
        /// Offending path as given by the caller.
        path: String,
    },

    /// File does not exist under the base directory.
    #[error("file not found: {path}")]
    NotFound {
        /// Offending path as given by the caller.
        path: String,
    },

    /// Content exceeded a configured byte cap.
    #[error("content exceeds cap of {limit} bytes")]
    TooLarge {
        /// The cap that was exceeded.
        limit: usize,
    },

    /// URL failed to parse or lacks a host.
    #[error("invalid url: {detail}")]
    InvalidUrl {
        /// Parser diagnostic.
        detail: String,
    },

    /// URL scheme outside the allowed set.
    #[error("scheme not allowed: {scheme}")]
    SchemeNotAllowed {
        /// The rejected scheme.
        scheme: String,
    },

    /// Target address failed SSRF checks.
    #[error("address blocked: {detail}")]
    Ssrf {
        /// Which check rejected the address.
        detail: String,
    },

    /// Host is not covered by allowlist or approval.
    #[error("host not allowed: {host}")]
    HostNotAllowed {
        /// The rejected host.
        host: String,
    },

    /// Redirect chain exceeded the hop limit.
    #[error("too many redirects")]
    RedirectLimit,

    /// Redirect response without a usable Location header.
    #[error("redirect without location")]
    MissingRedirectLocation,

    /// Transport failure: DNS, TLS, connect, timeout, reset.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Repository archive could not be decoded.
    #[error("archive error: {detail}")]
    Archive {
        /// Decoder diagnostic.
        detail: String,
    },
}
