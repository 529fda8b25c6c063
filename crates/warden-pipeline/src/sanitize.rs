//! # Sanitizer
//!
//! Renders markup inert without discarding the semantics a reviewer needs:
//!
//! - HTML: `<script>`, `<style>`, `<iframe>`, `<object>`, `<embed>` blocks
//!   are removed with their content; remaining tags are stripped but their
//!   text content survives; `javascript:` URLs are defused.
//! - Markdown: images with non-http(s) targets collapse to their alt text;
//!   links whose visible text misleads about the destination are rewritten
//!   to the explicit `TEXT (URL)` form; fenced code is treated as opaque
//!   text and never interpreted as markup.
//! - Hazard runs flagged by the normalizer collapse into a visible
//!   placeholder of the form `[U+202E×3]`.
//!
//! Every transformation preserves line structure so that finding spans and
//! reviewer line references stay usable, and the whole pass is idempotent:
//! sanitizing already-sanitized text is a no-op.

use regex::Regex;
use std::sync::OnceLock;

use crate::normalize::hazard_runs;

fn dangerous_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|iframe|object|embed)\b[^>]*>.*?</(script|style|iframe|object|embed)\s*>")
            .unwrap()
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").unwrap())
}

fn js_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)javascript\s*:").unwrap())
}

fn image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[([^\]\n]*)\]\(\s*([^)\n]*?)\s*\)").unwrap())
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]\n]+)\]\(\s*([^)\n]*?)\s*\)").unwrap())
}

fn domain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b([a-z0-9][a-z0-9-]*(?:\.[a-z0-9][a-z0-9-]*)+)\b").unwrap())
}

/// Sanitize normalized text into an inert rendering.
pub fn sanitize(text: &str) -> String {
    let collapsed = collapse_hazards(text);

    let mut out = String::with_capacity(collapsed.len());
    let mut outside = String::new();
    let mut in_fence = false;

    // Fenced regions are opaque: markup inside them is shown, not
    // interpreted. Everything else accumulates into `outside` segments so
    // multi-line HTML blocks can be removed across line boundaries.
    for (i, line) in collapsed.split('\n').enumerate() {
        if i > 0 {
            if in_fence {
                out.push('\n');
            } else {
                outside.push('\n');
            }
        }
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            if in_fence {
                out.push_str(line);
                in_fence = false;
            } else {
                out.push_str(&sanitize_markup(&outside));
                outside.clear();
                out.push_str(line);
                in_fence = true;
            }
        } else if in_fence {
            out.push_str(&neutralize_opaque(line));
        } else {
            outside.push_str(line);
        }
    }
    out.push_str(&sanitize_markup(&outside));
    out
}

/// Collapse hazard runs into visible placeholders.
fn collapse_hazards(text: &str) -> String {
    let runs = hazard_runs(text);
    if runs.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for run in runs {
        out.push_str(&text[cursor..run.start]);
        out.push_str(&format!("[U+{:04X}\u{D7}{}]", run.first as u32, run.count));
        cursor = run.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Render a line inside a fenced block harmless without interpreting it.
///
/// `<` becomes U+2039 so embedded HTML can never re-activate while the code
/// stays readable; the substitution is a fixed point.
fn neutralize_opaque(line: &str) -> String {
    line.replace('<', "\u{2039}")
}

/// HTML and markdown neutralization for non-fenced text.
fn sanitize_markup(segment: &str) -> String {
    if segment.is_empty() {
        return String::new();
    }

    // Dangerous elements disappear with their content; the newlines they
    // spanned are kept so line numbers downstream stay stable.
    let step = dangerous_block_re().replace_all(segment, |caps: &regex::Captures<'_>| {
        "\n".repeat(caps[0].matches('\n').count())
    });

    let step = tag_re().replace_all(&step, |caps: &regex::Captures<'_>| {
        "\n".repeat(caps[0].matches('\n').count())
    });

    let step = js_url_re().replace_all(&step, "blocked-js:");

    let step = image_re().replace_all(&step, |caps: &regex::Captures<'_>| {
        let alt = &caps[1];
        let url = &caps[2];
        if is_http_url(url) || is_hazard_placeholder(alt) {
            caps[0].to_string()
        } else {
            alt.to_string()
        }
    });

    let step = link_re().replace_all(&step, |caps: &regex::Captures<'_>| {
        let label = &caps[1];
        let url = &caps[2];
        if !is_hazard_placeholder(label) && link_text_misleads(label, url) {
            format!("{} ({})", label, url)
        } else {
            caps[0].to_string()
        }
    });

    step.into_owned()
}

/// True when bracketed text is a hazard placeholder, not a markdown label.
///
/// Keeps the markdown rewrites from re-interpreting `[U+202E\u{D7}3](x)` as a
/// link on a second sanitization pass.
fn is_hazard_placeholder(label: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^U\+[0-9A-F]{4,6}\u{D7}\d+$").unwrap());
    re.is_match(label)
}

fn is_http_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Host component of a URL-ish string, without a `url` parser.
fn host_of(url: &str) -> Option<String> {
    let rest = url.split("://").nth(1)?;
    let host = rest
        .split(['/', '?', '#'])
        .next()?
        .split('@')
        .next_back()?
        .split(':')
        .next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Does the visible link text mislead about the link target?
///
/// Misleading means: the target is not http(s) at all, or the text shows a
/// domain that differs from the target host (the classic
/// `[github.com](https://evil.example)` misdirection).
fn link_text_misleads(label: &str, url: &str) -> bool {
    if !is_http_url(url) {
        return true;
    }
    let Some(host) = host_of(url) else {
        return true;
    };
    if let Some(caps) = domain_re().captures(label) {
        let shown = caps[1].to_ascii_lowercase();
        return shown != host && !host.ends_with(&format!(".{}", shown));
    }
    false
}
