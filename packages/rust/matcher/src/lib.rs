//! Tiered matching of price entries to catalog vehicles.
//!
//! Three escalating comparison strategies (exact, normalized, and
//! fuzzy/semantic) resolve ambiguous, partial, multi-language identifiers
//! into a single best candidate under uncertainty. All three tiers are
//! evaluated and recorded for diagnostics, but the final method is decided
//! by strict escalation: the first tier to clear its threshold wins and
//! later tiers cannot change it.

mod confidence;
mod tiers;

use tracing::{debug, instrument};

use lineup_scorer::SimilarityScorer;
use lineup_shared::{
    CatalogVehicle, MatchMethod, MatchingConfig, MatchingResult, PriceEntry, TierOutcome,
};

pub use confidence::{overall_confidence, requires_human_review};
pub use tiers::{tier1_exact, tier2_normalized, tier3_semantic, tier3_threshold};

/// Match one price entry against a candidate set.
///
/// Returns the best-confidence candidate (or `None` when no tier cleared its
/// threshold) together with the full diagnostic [`MatchingResult`]. Never
/// fails: an empty candidate set or an unavailable scorer yields a no-match
/// result with the issue recorded, not an error.
#[instrument(skip_all, fields(model_code = %entry.model_code, candidates = candidates.len()))]
pub async fn match_price_to_catalog<'a>(
    entry: &PriceEntry,
    candidates: &'a [CatalogVehicle],
    config: &MatchingConfig,
    scorer: &dyn SimilarityScorer,
) -> (Option<&'a CatalogVehicle>, MatchingResult) {
    if candidates.is_empty() {
        debug!("empty candidate set");
        let result = MatchingResult {
            model_code: entry.model_code.clone(),
            tier1: TierOutcome::default(),
            tier2: TierOutcome::default(),
            tier3: TierOutcome::default(),
            final_matching_method: MatchMethod::None,
            overall_confidence: 0.0,
            requires_human_review: true,
            quality_issues: vec!["empty candidate set".into()],
        };
        return (None, result);
    }

    let mut quality_issues = Vec::new();

    // All tiers run for diagnostics; escalation only decides the winner.
    let eval1 = tiers::tier1_exact(entry, candidates, config);
    let eval2 = tiers::tier2_normalized(entry, candidates, config);
    let eval3 = tiers::tier3_semantic(entry, candidates, config, scorer).await;

    if eval3.outcome.evidence.get("status").map(String::as_str) == Some("unavailable") {
        quality_issues.push("tier 3 scorer unavailable".into());
    }

    // First tier that cleared its threshold decides the match.
    let (method, winner_idx) = if eval1.outcome.hit {
        (MatchMethod::Exact, eval1.best)
    } else if eval2.outcome.hit {
        (MatchMethod::Normalized, eval2.best)
    } else if eval3.outcome.hit {
        (MatchMethod::Semantic, eval3.best)
    } else {
        (MatchMethod::None, None)
    };

    let overall = confidence::overall_confidence(
        method,
        &eval1.outcome,
        &eval2.outcome,
        &eval3.outcome,
    );
    let review = confidence::requires_human_review(method, overall, config);

    if entry.model.is_empty() {
        quality_issues.push("price entry has no model name".into());
    }

    let result = MatchingResult {
        model_code: entry.model_code.clone(),
        tier1: eval1.outcome,
        tier2: eval2.outcome,
        tier3: eval3.outcome,
        final_matching_method: method,
        overall_confidence: overall,
        requires_human_review: review,
        quality_issues,
    };

    debug!(
        method = %result.final_matching_method,
        confidence = result.overall_confidence,
        review = result.requires_human_review,
        "matching finished"
    );

    (winner_idx.map(|i| &candidates[i]), result)
}
