//! Confidence aggregation and the human-review decision.
//!
//! Escalation means only the winning tier's score is authoritative: the
//! overall confidence is never a blend across tiers. When no tier cleared
//! its threshold, the best attempted confidence is reported for triage.

use lineup_shared::{MatchMethod, MatchingConfig, TierOutcome};

/// Overall confidence for a finished evaluation.
///
/// Returns the winning tier's confidence, or the best attempted confidence
/// across tiers when no tier won.
pub fn overall_confidence(
    method: MatchMethod,
    tier1: &TierOutcome,
    tier2: &TierOutcome,
    tier3: &TierOutcome,
) -> f64 {
    let raw = match method {
        MatchMethod::Exact => tier1.confidence,
        MatchMethod::Normalized => tier2.confidence,
        MatchMethod::Semantic => tier3.confidence,
        MatchMethod::None => tier1
            .confidence
            .max(tier2.confidence)
            .max(tier3.confidence),
    };
    raw.clamp(0.0, 1.0)
}

/// Whether a human must review this evaluation before publishing.
///
/// Always required when nothing matched; otherwise required whenever the
/// overall confidence falls below the auto-accept threshold.
pub fn requires_human_review(
    method: MatchMethod,
    overall_confidence: f64,
    config: &MatchingConfig,
) -> bool {
    method == MatchMethod::None || overall_confidence < config.auto_accept_threshold
}
