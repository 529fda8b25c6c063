//! # Decider
//!
//! Maps a risk score plus reason set onto the three-way [`Decision`] using
//! per-profile thresholds:
//!
//! | profile    | ALLOW if     | WARN if            | BLOCK if                          |
//! |------------|--------------|--------------------|-----------------------------------|
//! | strict     | score < 0.20 | 0.20 <= s < 0.40   | s >= 0.40 or hard-block reason    |
//! | balanced   | score < 0.35 | 0.35 <= s < 0.65   | s >= 0.65 or hard-block reason    |
//! | permissive | score < 0.55 | 0.55 <= s < 0.80   | s >= 0.80 or hard-block reason    |
//!
//! Decisions are computed from the sorted reason set and the score rounded
//! to four decimal places, so equal inputs can never flap between runs.

use serde::{Deserialize, Serialize};

use crate::codes;
use crate::models::Decision;
use crate::packs::Tier;

/// Detection profile selecting thresholds and the active rule tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Lowest thresholds, every rule tier active.
    Strict,
    /// Production default.
    #[default]
    Balanced,
    /// Highest thresholds, core tier only.
    Permissive,
}

impl Profile {
    /// Stable name used in the policy version hash.
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Strict => "strict",
            Profile::Balanced => "balanced",
            Profile::Permissive => "permissive",
        }
    }

    /// `(warn_threshold, block_threshold)` for this profile.
    pub fn thresholds(&self) -> (f64, f64) {
        match self {
            Profile::Strict => (0.20, 0.40),
            Profile::Balanced => (0.35, 0.65),
            Profile::Permissive => (0.55, 0.80),
        }
    }

    /// Whether rules of the given tier run under this profile.
    ///
    /// The sets nest: everything permissive runs also runs under balanced
    /// and strict.
    pub fn includes(&self, tier: Tier) -> bool {
        match (self, tier) {
            (_, Tier::Permissive) => true,
            (Profile::Strict, _) => true,
            (Profile::Balanced, Tier::Balanced) => true,
            _ => false,
        }
    }

    /// Is this reason code an unconditional block under this profile?
    pub fn is_hard_block(&self, code: &str) -> bool {
        match code {
            codes::SSRF_BLOCKED
            | codes::NEW_SOURCE_REQUIRES_APPROVAL
            | codes::TAG_CHARS
            | codes::SIZE_EXCEEDED => true,
            codes::ENCODING_INVALID => matches!(self, Profile::Strict),
            _ => false,
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Profile::Strict),
            "balanced" => Ok(Profile::Balanced),
            "permissive" => Ok(Profile::Permissive),
            other => Err(format!("unknown profile: {other}")),
        }
    }
}

/// Reason codes whose presence on a BLOCK hides the sanitized rendering.
pub fn hides_sanitized(reasons: &[String]) -> bool {
    reasons
        .iter()
        .any(|r| r == codes::SECRET_EXFIL || r == codes::SSRF_BLOCKED)
}

/// Apply profile thresholds and hard-block reasons.
pub fn decide(profile: Profile, risk_score: f64, reasons: &[String]) -> Decision {
    let mut sorted: Vec<&String> = reasons.iter().collect();
    sorted.sort();

    if sorted.iter().any(|r| profile.is_hard_block(r)) {
        return Decision::Block;
    }

    let score = round4(risk_score);
    let (warn, block) = profile.thresholds();
    if score >= block {
        Decision::Block
    } else if score >= warn {
        Decision::Warn
    } else {
        Decision::Allow
    }
}

/// Round to four decimal places.
pub fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reasons(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_thresholds_per_profile() {
        assert_eq!(decide(Profile::Balanced, 0.10, &[]), Decision::Allow);
        assert_eq!(decide(Profile::Balanced, 0.40, &[]), Decision::Warn);
        assert_eq!(decide(Profile::Balanced, 0.70, &[]), Decision::Block);

        assert_eq!(decide(Profile::Strict, 0.25, &[]), Decision::Warn);
        assert_eq!(decide(Profile::Permissive, 0.70, &[]), Decision::Warn);
        assert_eq!(decide(Profile::Permissive, 0.85, &[]), Decision::Block);
    }

    #[test]
    fn test_boundary_is_inclusive_for_warn_and_block() {
        assert_eq!(decide(Profile::Balanced, 0.35, &[]), Decision::Warn);
        assert_eq!(decide(Profile::Balanced, 0.65, &[]), Decision::Block);
    }

    #[test]
    fn test_hard_block_overrides_low_score() {
        let r = reasons(&[codes::SSRF_BLOCKED]);
        assert_eq!(decide(Profile::Permissive, 0.0, &r), Decision::Block);

        let r = reasons(&[codes::TAG_CHARS]);
        assert_eq!(decide(Profile::Permissive, 0.0, &r), Decision::Block);
    }

    #[test]
    fn test_encoding_invalid_hard_blocks_strict_only() {
        let r = reasons(&[codes::ENCODING_INVALID]);
        assert_eq!(decide(Profile::Strict, 0.0, &r), Decision::Block);
        assert_eq!(decide(Profile::Balanced, 0.0, &r), Decision::Allow);
    }

    #[test]
    fn test_tier_nesting() {
        assert!(Profile::Permissive.includes(Tier::Permissive));
        assert!(!Profile::Permissive.includes(Tier::Balanced));
        assert!(Profile::Balanced.includes(Tier::Balanced));
        assert!(!Profile::Balanced.includes(Tier::Strict));
        assert!(Profile::Strict.includes(Tier::Strict));
    }

    #[test]
    fn test_hides_sanitized_set() {
        assert!(hides_sanitized(&reasons(&[codes::SECRET_EXFIL])));
        assert!(hides_sanitized(&reasons(&[codes::SSRF_BLOCKED])));
        assert!(!hides_sanitized(&reasons(&[codes::POLICY_OVERRIDE])));
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(0.65), 0.65);
    }
}
