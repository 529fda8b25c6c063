//! Capped repository archive ingest.
//!
//! Repositories are fetched as forge archives (`<url>/archive/<ref>.tar.gz`)
//! over HTTPS only, streamed under three caps: total archive bytes,
//! per-file bytes, and file count. Forges routinely redirect archive
//! requests (GitHub hands them to codeload), so redirects are followed
//! manually like [`crate::web::WebFetcher`] does: at most
//! [`MAX_REDIRECTS`] hops, each re-checked for scheme and SSRF before it
//! is contacted. Entries are unpacked in memory; the leading archive
//! directory is stripped so paths look like worktree paths;
//! include/exclude prefix filters narrow what gets scanned.

use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::header::LOCATION;
use tracing::{debug, warn};
use url::Url;

use crate::web::{read_capped, MAX_REDIRECTS};
use crate::{ssrf, FetchError};

/// Caps applied to one repository fetch.
#[derive(Debug, Clone, Copy)]
pub struct RepoCaps {
    /// Compressed archive byte cap.
    pub max_bytes: usize,
    /// Per-file byte cap; larger files are skipped.
    pub max_file_bytes: usize,
    /// File count cap; extraction stops once reached.
    pub max_files: usize,
}

/// One file extracted from the archive.
#[derive(Debug, Clone)]
pub struct RepoFile {
    /// Path inside the repository (leading archive dir stripped).
    pub path: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Repository fetcher.
#[derive(Debug, Clone)]
pub struct RepoFetcher {
    client: reqwest::Client,
    caps: RepoCaps,
}

impl RepoFetcher {
    /// Build a fetcher with the given deadline and caps.
    ///
    /// Redirects are disabled at the client so every hop goes back through
    /// the scheme and SSRF checks in [`RepoFetcher::fetch`].
    pub fn new(timeout: Duration, caps: RepoCaps) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .user_agent("bridgewarden/0.1")
            .build()?;
        Ok(Self { client, caps })
    }

    /// The configured caps.
    pub fn caps(&self) -> &RepoCaps {
        &self.caps
    }

    /// Download and unpack `<url>/archive/<ref>.tar.gz`.
    ///
    /// Every redirect hop re-passes the HTTPS-only and SSRF checks before
    /// it is contacted; a forge that answers the archive request with a
    /// redirect to an internal address is a violation, not a convenience.
    pub async fn fetch(
        &self,
        repo_url: &str,
        git_ref: &str,
        include: &[String],
        exclude: &[String],
    ) -> Result<Vec<RepoFile>, FetchError> {
        let base = Url::parse(repo_url).map_err(|e| FetchError::InvalidUrl {
            detail: e.to_string(),
        })?;
        if base.scheme() != "https" {
            return Err(FetchError::SchemeNotAllowed {
                scheme: base.scheme().to_string(),
            });
        }

        let trimmed = base.as_str().trim_end_matches('/');
        let archive_url = format!("{trimmed}/archive/{git_ref}.tar.gz");
        let mut current = Url::parse(&archive_url).map_err(|e| FetchError::InvalidUrl {
            detail: e.to_string(),
        })?;

        for hop in 0..=MAX_REDIRECTS {
            if current.scheme() != "https" {
                return Err(FetchError::SchemeNotAllowed {
                    scheme: current.scheme().to_string(),
                });
            }
            ssrf::check_url(&current).await?;

            debug!(url = %current, hop, "downloading repo archive");
            let response = self.client.get(current.clone()).send().await?;

            if response.status().is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or(FetchError::MissingRedirectLocation)?;
                current = current.join(location).map_err(|e| FetchError::InvalidUrl {
                    detail: e.to_string(),
                })?;
                continue;
            }

            let archive = read_capped(response, self.caps.max_bytes).await?;
            return self.unpack(&archive, include, exclude);
        }

        warn!(url = %archive_url, "redirect chain exceeded {MAX_REDIRECTS} hops");
        Err(FetchError::RedirectLimit)
    }

    /// Unpack an archive already in memory, applying filters and caps.
    pub fn unpack(
        &self,
        archive: &[u8],
        include: &[String],
        exclude: &[String],
    ) -> Result<Vec<RepoFile>, FetchError> {
        let decoder = GzDecoder::new(archive);
        let mut tar = tar::Archive::new(decoder);
        let mut files = Vec::new();

        let entries = tar.entries().map_err(|e| FetchError::Archive {
            detail: e.to_string(),
        })?;
        for entry in entries {
            if files.len() >= self.caps.max_files {
                warn!(cap = self.caps.max_files, "file count cap reached, truncating");
                break;
            }
            let mut entry = entry.map_err(|e| FetchError::Archive {
                detail: e.to_string(),
            })?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry
                .path()
                .map_err(|e| FetchError::Archive {
                    detail: e.to_string(),
                })?
                .to_string_lossy()
                .into_owned();
            let Some(rel) = strip_archive_root(&path) else {
                continue;
            };
            // A hostile archive can carry traversal components; such
            // entries are dropped, never resolved.
            if rel.split('/').any(|c| c == ".." || c.is_empty()) || rel.starts_with('/') {
                warn!(path = rel, "archive entry with traversal component, skipped");
                continue;
            }
            if !path_selected(rel, include, exclude) {
                continue;
            }
            if entry.size() > self.caps.max_file_bytes as u64 {
                warn!(path = rel, size = entry.size(), "file exceeds per-file cap, skipped");
                continue;
            }
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| FetchError::Archive {
                    detail: e.to_string(),
                })?;
            files.push(RepoFile {
                path: rel.to_string(),
                bytes,
            });
        }
        Ok(files)
    }
}

/// Drop the `repo-ref/` directory every forge archive prepends.
fn strip_archive_root(path: &str) -> Option<&str> {
    let rel = path.split_once('/')?.1;
    if rel.is_empty() {
        None
    } else {
        Some(rel)
    }
}

/// Prefix-based include/exclude selection; empty include means everything.
fn path_selected(path: &str, include: &[String], exclude: &[String]) -> bool {
    if exclude.iter().any(|p| path.starts_with(p.as_str())) {
        return false;
    }
    include.is_empty() || include.iter().any(|p| path.starts_with(p.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn caps() -> RepoCaps {
        RepoCaps {
            max_bytes: 1024 * 1024,
            max_file_bytes: 1024,
            max_files: 10,
        }
    }

    fn fetcher() -> RepoFetcher {
        RepoFetcher::new(Duration::from_secs(5), caps()).unwrap()
    }

    /// Build a small repo-shaped tar.gz in memory.
    fn archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, bytes) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("repo-main/{path}"), *bytes)
                .unwrap();
        }
        let tarball = builder.into_inner().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tarball).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_unpack_strips_archive_root() {
        let data = archive(&[("README.md", b"hello"), ("src/lib.rs", b"code")]);
        let files = fetcher().unpack(&data, &[], &[]).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/lib.rs"]);
        assert_eq!(files[0].bytes, b"hello");
    }

    #[test]
    fn test_include_filter() {
        let data = archive(&[("README.md", b"a"), ("src/lib.rs", b"b"), ("src/x.rs", b"c")]);
        let files = fetcher()
            .unpack(&data, &["src/".to_string()], &[])
            .unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.path.starts_with("src/")));
    }

    #[test]
    fn test_exclude_filter_wins() {
        let data = archive(&[("src/lib.rs", b"b"), ("src/gen/big.rs", b"c")]);
        let files = fetcher()
            .unpack(&data, &["src/".to_string()], &["src/gen/".to_string()])
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "src/lib.rs");
    }

    #[test]
    fn test_per_file_cap_skips() {
        let big = vec![b'x'; 2048];
        let data = archive(&[("small.txt", b"ok"), ("big.bin", &big)]);
        let files = fetcher().unpack(&data, &[], &[]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "small.txt");
    }

    #[test]
    fn test_file_count_cap_truncates() {
        let entries: Vec<(String, Vec<u8>)> = (0..20)
            .map(|i| (format!("f{i}.txt"), vec![b'a']))
            .collect();
        let borrowed: Vec<(&str, &[u8])> = entries
            .iter()
            .map(|(p, b)| (p.as_str(), b.as_slice()))
            .collect();
        let data = archive(&borrowed);
        let files = fetcher().unpack(&data, &[], &[]).unwrap();
        assert_eq!(files.len(), 10);
    }

    #[test]
    fn test_garbage_archive_errors() {
        let err = fetcher().unpack(b"not a tarball", &[], &[]).unwrap_err();
        assert!(matches!(err, FetchError::Archive { .. }));
    }

    #[tokio::test]
    async fn test_http_repo_url_rejected() {
        let err = fetcher()
            .fetch("http://forge.example/r", "main", &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::SchemeNotAllowed { .. }));
    }

    #[tokio::test]
    async fn test_internal_address_rejected_before_io() {
        let err = fetcher()
            .fetch("https://169.254.169.254/team/repo", "main", &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Ssrf { .. }));
    }
}
