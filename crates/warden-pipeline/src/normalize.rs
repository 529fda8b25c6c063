//! # Normalizer
//!
//! First pipeline stage: turns raw bytes into canonical Unicode text and
//! flags the structural hazards that later stages act on.
//!
//! Steps, in order:
//!
//! 1. Decode to Unicode (UTF-16 when a BOM says so, UTF-8 otherwise);
//!    invalid sequences become U+FFFD and emit `ENCODING_INVALID`.
//! 2. NFKC normalization, collapsing compatibility variants that are the
//!    cheap half of homoglyph obfuscation (fullwidth forms, ligatures).
//! 3. Newline canonicalization to `\n` and leading-BOM removal.
//! 4. Hazard scan: bidi controls, zero-width characters, tag characters,
//!    and private-use runs, each with the span of its first occurrence.
//! 5. Shadow projection: a lowercased `[a-z0-9]`-only copy of the text with
//!    an index back to the original spans, used by the detector to match
//!    phrases through invisible-character padding.

use unicode_normalization::{is_nfkc_quick, IsNormalized, UnicodeNormalization};

use crate::codes;
use crate::models::Finding;

/// Hazard character classes flagged during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardClass {
    /// Bidirectional embedding/override/isolate controls.
    Bidi,
    /// Zero-width and invisible joiners, marks, interior BOMs.
    ZeroWidth,
    /// Tag characters (U+E0000..U+E007F).
    Tag,
    /// Private-use code points, flagged only in runs of four or more.
    PrivateUse,
}

impl HazardClass {
    /// The reason code this class maps to.
    pub fn code(&self) -> &'static str {
        match self {
            HazardClass::Bidi => codes::BIDI_CONTROL,
            HazardClass::ZeroWidth => codes::ZERO_WIDTH,
            HazardClass::Tag => codes::TAG_CHARS,
            HazardClass::PrivateUse => codes::PRIVATE_USE_RUN,
        }
    }

    /// Fixed score contribution of this class.
    pub fn weight(&self) -> f64 {
        match self {
            HazardClass::Bidi => 0.6,
            HazardClass::ZeroWidth => 0.4,
            HazardClass::Tag => 0.7,
            HazardClass::PrivateUse => 0.3,
        }
    }
}

/// A maximal run of consecutive hazard characters of one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HazardRun {
    /// Hazard class of every character in the run.
    pub class: HazardClass,
    /// Byte offset of the run start in the normalized text.
    pub start: usize,
    /// Byte offset one past the run end.
    pub end: usize,
    /// First code point of the run, used for the visible placeholder.
    pub first: char,
    /// Number of code points in the run.
    pub count: usize,
}

/// Shadow projection of the normalized text.
///
/// `text` holds only lowercased ASCII alphanumerics; `map[i]` is the byte
/// offset in the normalized text of the character that produced shadow
/// byte `i`.
#[derive(Debug, Clone, Default)]
pub struct Shadow {
    /// The collapsed alphanumeric text.
    pub text: String,
    /// Shadow byte index to normalized-text byte offset.
    pub map: Vec<usize>,
}

impl Shadow {
    /// Map a shadow byte range back to a span in the normalized text.
    pub fn span(&self, start: usize, end: usize) -> (usize, usize) {
        let from = self.map.get(start).copied().unwrap_or(0);
        let to = if end == 0 {
            from
        } else {
            // End of the last contributing character: its offset plus one
            // ASCII byte, since only ASCII alphanumerics enter the shadow.
            self.map.get(end - 1).map(|o| o + 1).unwrap_or(from)
        };
        (from, to)
    }
}

/// Output of the normalization stage.
#[derive(Debug, Clone)]
pub struct Normalized {
    /// Canonical Unicode text.
    pub text: String,
    /// Collapsed alphanumeric shadow with span index.
    pub shadow: Shadow,
    /// Structural findings: encoding damage and hazard classes.
    pub findings: Vec<Finding>,
}

/// Normalize raw bytes into canonical text plus structural findings.
pub fn normalize(bytes: &[u8]) -> Normalized {
    let (decoded, had_invalid) = decode_bytes(bytes);

    let nfkc = apply_nfkc(&decoded);
    let text = canonicalize_newlines(&nfkc);

    let mut findings = Vec::new();
    if had_invalid {
        findings.push(Finding::new(codes::ENCODING_INVALID, 0.5));
    }

    // One finding per hazard class, anchored to the first run; the
    // sanitizer re-derives the full run list for placeholder rendering.
    let runs = hazard_runs(&text);
    for class in [
        HazardClass::Bidi,
        HazardClass::ZeroWidth,
        HazardClass::Tag,
        HazardClass::PrivateUse,
    ] {
        if let Some(run) = runs.iter().find(|r| r.class == class) {
            findings.push(Finding::with_span(
                class.code(),
                class.weight(),
                run.start,
                run.end,
            ));
        }
    }

    let shadow = project_shadow(&text);

    Normalized {
        text,
        shadow,
        findings,
    }
}

/// Decode bytes to a string, honoring UTF-16 BOMs and falling back to
/// UTF-8. Returns the text and whether any invalid sequence was replaced.
fn decode_bytes(bytes: &[u8]) -> (String, bool) {
    if bytes.len() >= 2 {
        if bytes[0] == 0xFF && bytes[1] == 0xFE {
            return decode_utf16(&bytes[2..], true);
        }
        if bytes[0] == 0xFE && bytes[1] == 0xFF {
            return decode_utf16(&bytes[2..], false);
        }
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => (s.to_string(), false),
        Err(_) => (String::from_utf8_lossy(bytes).into_owned(), true),
    }
}

fn decode_utf16(bytes: &[u8], little_endian: bool) -> (String, bool) {
    let mut had_invalid = bytes.len() % 2 != 0;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| {
            if little_endian {
                u16::from_le_bytes([c[0], c[1]])
            } else {
                u16::from_be_bytes([c[0], c[1]])
            }
        })
        .collect();

    let mut out = String::with_capacity(units.len());
    for r in char::decode_utf16(units) {
        match r {
            Ok(c) => out.push(c),
            Err(_) => {
                had_invalid = true;
                out.push('\u{FFFD}');
            }
        }
    }
    (out, had_invalid)
}

/// NFKC with the quick-check fast path.
fn apply_nfkc(input: &str) -> String {
    if is_nfkc_quick(input.chars()) == IsNormalized::Yes {
        input.to_string()
    } else {
        input.nfkc().collect()
    }
}

/// Canonicalize `\r\n` and lone `\r` to `\n`; strip a leading BOM.
fn canonicalize_newlines(input: &str) -> String {
    let input = input.strip_prefix('\u{FEFF}').unwrap_or(input);
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    out
}

/// Classify a single character, ignoring run-length rules.
fn raw_class(c: char) -> Option<HazardClass> {
    match c {
        '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}' => Some(HazardClass::Bidi),
        '\u{200B}'..='\u{200F}' | '\u{2060}' | '\u{FEFF}' => Some(HazardClass::ZeroWidth),
        '\u{E0000}'..='\u{E007F}' => Some(HazardClass::Tag),
        '\u{E000}'..='\u{F8FF}' | '\u{F0000}'..='\u{FFFFD}' | '\u{100000}'..='\u{10FFFD}' => {
            Some(HazardClass::PrivateUse)
        }
        _ => None,
    }
}

/// Scan text for maximal hazard runs.
///
/// Private-use runs shorter than four code points are not hazards; the
/// other classes flag from a single character. A leading BOM never reaches
/// this function (stripped during canonicalization), so any U+FEFF seen
/// here is interior.
pub fn hazard_runs(text: &str) -> Vec<HazardRun> {
    let mut runs = Vec::new();
    let mut current: Option<HazardRun> = None;

    for (offset, c) in text.char_indices() {
        let class = raw_class(c);
        match (&mut current, class) {
            (Some(run), Some(class)) if run.class == class && run.end == offset => {
                run.end = offset + c.len_utf8();
                run.count += 1;
            }
            (maybe, class) => {
                if let Some(run) = maybe.take() {
                    push_run(&mut runs, run);
                }
                if let Some(class) = class {
                    current = Some(HazardRun {
                        class,
                        start: offset,
                        end: offset + c.len_utf8(),
                        first: c,
                        count: 1,
                    });
                }
            }
        }
    }
    if let Some(run) = current {
        push_run(&mut runs, run);
    }
    runs
}

fn push_run(runs: &mut Vec<HazardRun>, run: HazardRun) {
    if run.class == HazardClass::PrivateUse && run.count < 4 {
        return;
    }
    runs.push(run);
}

/// Build the collapsed alphanumeric shadow.
fn project_shadow(text: &str) -> Shadow {
    let mut shadow = Shadow {
        text: String::with_capacity(text.len()),
        map: Vec::with_capacity(text.len()),
    };
    for (offset, c) in text.char_indices() {
        if c.is_ascii_alphanumeric() {
            shadow.text.push(c.to_ascii_lowercase());
            shadow.map.push(offset);
        }
    }
    shadow
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ascii_passthrough() {
        let n = normalize(b"hello world");
        assert_eq!(n.text, "hello world");
        assert!(n.findings.is_empty());
    }

    #[test]
    fn test_invalid_utf8_replaced_and_flagged() {
        let n = normalize(&[0x68, 0xC3, 0x28]);
        assert_eq!(n.findings[0].code, codes::ENCODING_INVALID);
        assert!(n.text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_utf16_le_bom_decoding() {
        // "hi" in UTF-16LE with BOM
        let bytes = [0xFF, 0xFE, 0x68, 0x00, 0x69, 0x00];
        let n = normalize(&bytes);
        assert_eq!(n.text, "hi");
        assert!(n.findings.is_empty());
    }

    #[test]
    fn test_nfkc_collapses_fullwidth() {
        // Fullwidth "ignore" compatibility forms collapse to ASCII.
        let n = normalize("ｉｇｎｏｒｅ".as_bytes());
        assert_eq!(n.text, "ignore");
    }

    #[test]
    fn test_newline_canonicalization() {
        let n = normalize(b"a\r\nb\rc\nd");
        assert_eq!(n.text, "a\nb\nc\nd");
    }

    #[test]
    fn test_leading_bom_stripped_without_finding() {
        let n = normalize("\u{FEFF}clean".as_bytes());
        assert_eq!(n.text, "clean");
        assert!(n.findings.is_empty());
    }

    #[test]
    fn test_interior_bom_is_zero_width() {
        let n = normalize("a\u{FEFF}b".as_bytes());
        assert_eq!(n.findings[0].code, codes::ZERO_WIDTH);
    }

    #[test]
    fn test_bidi_run_flagged_with_span() {
        let n = normalize("ab\u{202E}\u{202C}cd".as_bytes());
        let f = &n.findings[0];
        assert_eq!(f.code, codes::BIDI_CONTROL);
        assert_eq!(f.span, Some((2, 2 + 2 * '\u{202E}'.len_utf8())));
    }

    #[test]
    fn test_tag_chars_flagged() {
        let n = normalize("x\u{E0041}\u{E0042}".as_bytes());
        assert!(n.findings.iter().any(|f| f.code == codes::TAG_CHARS));
    }

    #[test]
    fn test_private_use_run_threshold() {
        let short = normalize("a\u{E000}\u{E001}\u{E002}b".as_bytes());
        assert!(short.findings.is_empty());

        let long = normalize("a\u{E000}\u{E001}\u{E002}\u{E003}b".as_bytes());
        assert_eq!(long.findings[0].code, codes::PRIVATE_USE_RUN);
    }

    #[test]
    fn test_one_finding_per_hazard_class() {
        let n = normalize("\u{200B}a\u{200B}b\u{200B}".as_bytes());
        let zw: Vec<_> = n
            .findings
            .iter()
            .filter(|f| f.code == codes::ZERO_WIDTH)
            .collect();
        assert_eq!(zw.len(), 1);
    }

    #[test]
    fn test_shadow_projection() {
        let n = normalize("Ign\u{200B}ore ALL!".as_bytes());
        assert_eq!(n.shadow.text, "ignoreall");
        // First shadow byte maps to the 'I' at offset 0.
        assert_eq!(n.shadow.map[0], 0);
    }

    #[test]
    fn test_shadow_span_roundtrip() {
        let n = normalize("ab cd".as_bytes());
        // shadow "abcd": bytes 2..4 are "cd", at text offsets 3..5.
        assert_eq!(n.shadow.span(2, 4), (3, 5));
    }

    #[test]
    fn test_hazard_runs_grouping() {
        let runs = hazard_runs("a\u{202A}\u{202B}b\u{200B}");
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].class, HazardClass::Bidi);
        assert_eq!(runs[0].count, 2);
        assert_eq!(runs[1].class, HazardClass::ZeroWidth);
    }
}
