//! Jailed local file reads.
//!
//! Paths are resolved against a canonicalized base directory and the
//! resolved target must stay inside it, which closes both `..` traversal
//! and symlinks pointing out of the jail.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::FetchError;

/// File fetcher rooted at a base directory.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    base: PathBuf,
    max_bytes: usize,
}

impl FileFetcher {
    /// Create a fetcher jailed to `base`.
    pub fn new(base: impl AsRef<Path>, max_bytes: usize) -> Result<Self, FetchError> {
        let base = base.as_ref();
        fs::create_dir_all(base)?;
        Ok(Self {
            base: base.canonicalize()?,
            max_bytes,
        })
    }

    /// The canonical base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Read a file by base-relative path.
    pub fn fetch(&self, rel: &str) -> Result<Vec<u8>, FetchError> {
        let requested = Path::new(rel);
        if requested.is_absolute() {
            return Err(FetchError::PathEscape {
                path: rel.to_string(),
            });
        }
        // Reject dot-dot before touching the filesystem; canonicalize below
        // still catches escapes routed through symlinks.
        if requested
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(FetchError::PathEscape {
                path: rel.to_string(),
            });
        }

        let candidate = self.base.join(requested);
        let resolved = candidate.canonicalize().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound {
                    path: rel.to_string(),
                }
            } else {
                FetchError::Io(e)
            }
        })?;

        if !resolved.starts_with(&self.base) {
            return Err(FetchError::PathEscape {
                path: rel.to_string(),
            });
        }

        let meta = fs::metadata(&resolved)?;
        if !meta.is_file() {
            return Err(FetchError::NotFound {
                path: rel.to_string(),
            });
        }
        if meta.len() > self.max_bytes as u64 {
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }

        debug!(path = %resolved.display(), bytes = meta.len(), "file fetched");
        Ok(fs::read(&resolved)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileFetcher) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("readme.md"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/inner.txt"), b"inner").unwrap();
        let fetcher = FileFetcher::new(dir.path(), 1024).unwrap();
        (dir, fetcher)
    }

    #[test]
    fn test_read_relative_file() {
        let (_dir, fetcher) = setup();
        assert_eq!(fetcher.fetch("readme.md").unwrap(), b"hello");
        assert_eq!(fetcher.fetch("sub/inner.txt").unwrap(), b"inner");
    }

    #[test]
    fn test_absolute_path_rejected() {
        let (_dir, fetcher) = setup();
        assert!(matches!(
            fetcher.fetch("/etc/hostname"),
            Err(FetchError::PathEscape { .. })
        ));
    }

    #[test]
    fn test_dotdot_rejected() {
        let (_dir, fetcher) = setup();
        assert!(matches!(
            fetcher.fetch("../outside.txt"),
            Err(FetchError::PathEscape { .. })
        ));
        assert!(matches!(
            fetcher.fetch("sub/../../outside.txt"),
            Err(FetchError::PathEscape { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let (dir, fetcher) = setup();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"secret").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            dir.path().join("sneaky.txt"),
        )
        .unwrap();
        assert!(matches!(
            fetcher.fetch("sneaky.txt"),
            Err(FetchError::PathEscape { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let (_dir, fetcher) = setup();
        assert!(matches!(
            fetcher.fetch("absent.md"),
            Err(FetchError::NotFound { .. })
        ));
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let (_dir, fetcher) = setup();
        assert!(matches!(
            fetcher.fetch("sub"),
            Err(FetchError::NotFound { .. })
        ));
    }

    #[test]
    fn test_byte_cap_enforced() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.bin"), vec![0u8; 64]).unwrap();
        let fetcher = FileFetcher::new(dir.path(), 16).unwrap();
        assert!(matches!(
            fetcher.fetch("big.bin"),
            Err(FetchError::TooLarge { limit: 16 })
        ));
    }
}
