//! Guarded HTTP fetching.
//!
//! Redirects are followed manually (at most [`MAX_REDIRECTS`] hops) so
//! that scheme, SSRF and host-allowlist checks run again at every hop; an
//! allow-listed host redirecting to an internal address is a violation,
//! not a convenience. Bodies are streamed under a byte cap and the whole
//! request observes the configured deadline.

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::{ssrf, FetchError};

/// Redirect hop limit.
pub const MAX_REDIRECTS: usize = 3;

/// How fetched documents are prepared for the pipeline.
///
/// Modes arrive over the wire as plain strings; see [`FetchMode::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Bytes handed to the pipeline as fetched.
    RawText,
    /// Readability-style main-content extraction applied first.
    #[default]
    ReadableText,
}

impl FetchMode {
    /// Parse the wire name used in tool arguments.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "raw_text" => Some(FetchMode::RawText),
            "readable_text" => Some(FetchMode::ReadableText),
            _ => None,
        }
    }
}

/// A fetched document plus attribution metadata.
#[derive(Debug, Clone)]
pub struct FetchedDoc {
    /// Body bytes after mode processing.
    pub bytes: Vec<u8>,
    /// URL after redirects.
    pub final_url: String,
    /// Host of the final URL.
    pub host: String,
}

/// HTTP fetcher with SSRF and cap enforcement.
#[derive(Debug, Clone)]
pub struct WebFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl WebFetcher {
    /// Build a fetcher with the given deadline and default byte cap.
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .user_agent("bridgewarden/0.1")
            .build()?;
        Ok(Self { client, max_bytes })
    }

    /// Fetch `url`, re-running all checks at every redirect hop.
    ///
    /// `host_allowed` is the caller's allowlist/approval predicate; it is
    /// consulted for the initial host and for every redirect target.
    pub async fn fetch(
        &self,
        url: &str,
        mode: FetchMode,
        max_bytes: Option<usize>,
        host_allowed: &(dyn Fn(&str) -> bool + Send + Sync),
    ) -> Result<FetchedDoc, FetchError> {
        let cap = max_bytes.unwrap_or(self.max_bytes).min(self.max_bytes);
        let mut current = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            detail: e.to_string(),
        })?;

        for hop in 0..=MAX_REDIRECTS {
            ssrf::check_url(&current).await?;
            let host = current
                .host_str()
                .ok_or_else(|| FetchError::InvalidUrl {
                    detail: "url has no host".to_string(),
                })?
                .to_string();
            if !host_allowed(&host) {
                return Err(FetchError::HostNotAllowed { host });
            }

            debug!(url = %current, hop, "fetching");
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

            let bytes = read_capped(response, cap).await?;
            let body = match mode {
                FetchMode::RawText => bytes,
                FetchMode::ReadableText => {
                    let text = String::from_utf8_lossy(&bytes);
                    extract_readable(&text).into_bytes()
                }
            };
            return Ok(FetchedDoc {
                bytes: body,
                final_url: current.to_string(),
                host,
            });
        }

        warn!(url, "redirect chain exceeded {MAX_REDIRECTS} hops");
        Err(FetchError::RedirectLimit)
    }
}

/// Stream the body, failing as soon as the cap is crossed.
pub(crate) async fn read_capped(
    mut response: reqwest::Response,
    cap: usize,
) -> Result<Vec<u8>, FetchError> {
    if let Some(len) = response.content_length() {
        if len > cap as u64 {
            return Err(FetchError::TooLarge { limit: cap });
        }
    }
    let mut body: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > cap {
            return Err(FetchError::TooLarge { limit: cap });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap())
}

/// Readability-style main-content extraction.
///
/// Not a layout engine: drop the subtrees that are never content (scripts,
/// styles, chrome), prefer an `<article>`/`<main>` region when one exists,
/// then flatten the survivors to text. The pipeline's sanitizer still runs
/// over the result, so this only has to be good, not perfect.
pub fn extract_readable(html: &str) -> String {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    static REGION: OnceLock<Regex> = OnceLock::new();
    static CHROME: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    static BLANK: OnceLock<Regex> = OnceLock::new();

    let noise = re(
        &NOISE,
        r"(?is)<(script|style|noscript|head|svg|template)\b[^>]*>.*?</(script|style|noscript|head|svg|template)\s*>",
    );
    let step = noise.replace_all(html, " ");

    let region = re(&REGION, r"(?is)<(article|main)\b[^>]*>(.*?)</(article|main)\s*>");
    let step = match region.captures(&step) {
        Some(caps) => caps[2].to_string(),
        None => step.into_owned(),
    };

    let chrome = re(
        &CHROME,
        r"(?is)<(nav|header|footer|aside)\b[^>]*>.*?</(nav|header|footer|aside)\s*>",
    );
    let step = chrome.replace_all(&step, " ");

    // Block-level closers become line breaks so paragraphs stay separated.
    let step = step
        .replace("</p>", "\n")
        .replace("</div>", "\n")
        .replace("</li>", "\n")
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n");

    let tag = re(&TAG, r"(?s)<[^>]*>");
    let step = tag.replace_all(&step, "");

    let step = step
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    let blank = re(&BLANK, r"\n[ \t]*(\n[ \t]*)+");
    blank.replace_all(step.trim(), "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(FetchMode::parse("raw_text"), Some(FetchMode::RawText));
        assert_eq!(
            FetchMode::parse("readable_text"),
            Some(FetchMode::ReadableText)
        );
        assert_eq!(FetchMode::parse("other"), None);
    }

    #[test]
    fn test_extract_prefers_article() {
        let html = r#"<html><head><title>t</title></head><body>
            <nav>menu menu</nav>
            <article><p>The actual story.</p><p>Second paragraph.</p></article>
            <footer>copyright</footer></body></html>"#;
        let text = extract_readable(html);
        assert!(text.contains("The actual story."));
        assert!(text.contains("Second paragraph."));
        assert!(!text.contains("menu"));
        assert!(!text.contains("copyright"));
    }

    #[test]
    fn test_extract_without_article_strips_chrome() {
        let html = "<body><header>site</header><p>body text</p><footer>f</footer></body>";
        let text = extract_readable(html);
        assert!(text.contains("body text"));
        assert!(!text.contains("site"));
    }

    #[test]
    fn test_extract_drops_scripts() {
        let html = "<p>keep</p><script>var x = 'drop';</script>";
        let text = extract_readable(html);
        assert!(text.contains("keep"));
        assert!(!text.contains("drop"));
    }

    #[test]
    fn test_extract_decodes_basic_entities() {
        assert_eq!(extract_readable("a &amp; b"), "a & b");
    }

    #[test]
    fn test_extract_plain_text_passthrough() {
        assert_eq!(extract_readable("no markup at all"), "no markup at all");
    }

    #[tokio::test]
    async fn test_fetch_rejects_loopback_before_io() {
        let fetcher = WebFetcher::new(Duration::from_secs(5), 1024).unwrap();
        let err = fetcher
            .fetch("http://127.0.0.1:9/x", FetchMode::RawText, None, &|_| true)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Ssrf { .. }));
    }

    #[tokio::test]
    async fn test_fetch_rejects_disallowed_host_before_io() {
        let fetcher = WebFetcher::new(Duration::from_secs(5), 1024).unwrap();
        let err = fetcher
            .fetch(
                "https://203.0.113.7/x",
                FetchMode::RawText,
                None,
                &|_| false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HostNotAllowed { .. }));
    }

    #[tokio::test]
    async fn test_fetch_rejects_bad_scheme() {
        let fetcher = WebFetcher::new(Duration::from_secs(5), 1024).unwrap();
        let err = fetcher
            .fetch("ftp://example.com/x", FetchMode::RawText, None, &|_| true)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::SchemeNotAllowed { .. }));
    }
}
