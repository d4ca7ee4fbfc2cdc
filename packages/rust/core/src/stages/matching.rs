//! Stage 1 — base model matching.
//!
//! Wraps the tiered matcher and stores its verdict into the context. The
//! only stage that can leave the pipeline without a base model: when that
//! happens and no fallback family is configured, the driver skips straight
//! to final validation and the entry still produces a flagged LOW record.

use lineup_normalizer::normalize_model_name;
use lineup_scorer::SimilarityScorer;
use lineup_shared::{
    CatalogVehicle, LineupError, MatchingConfig, ProcessingStage, StageResult,
};
use tracing::debug;

use crate::context::PipelineContext;

/// Run tiered matching for the context's price entry.
pub async fn run(
    ctx: &mut PipelineContext,
    candidates: &[CatalogVehicle],
    config: &MatchingConfig,
    scorer: &dyn SimilarityScorer,
) -> StageResult {
    let (best, result) =
        lineup_matcher::match_price_to_catalog(&ctx.price_entry, candidates, config, scorer)
            .await;

    let mut notes = Vec::new();
    let confidence = result.overall_confidence;
    let mut matched = best.is_some();

    if let Some(vehicle) = best {
        ctx.matched_base_model = Some(vehicle.clone());
        notes.push(format!(
            "matched base model {} via {}",
            vehicle.id, result.final_matching_method
        ));
    } else if let Some(fallback) = fallback_candidate(candidates, config) {
        // Operator-configured fallback family: adopt it, but keep the low
        // attempted confidence so the record stays in review.
        ctx.matched_base_model = Some(fallback.clone());
        matched = true;
        notes.push(format!(
            "no tier cleared its threshold; fell back to configured family candidate {}",
            fallback.id
        ));
    } else {
        let err = LineupError::MissingBaseModel {
            model_code: ctx.price_entry.model_code.clone(),
        };
        notes.push(err.to_string());
    }

    for issue in &result.quality_issues {
        notes.push(format!("matching quality issue: {issue}"));
    }

    debug!(
        model_code = %ctx.price_entry.model_code,
        matched,
        confidence,
        "base model matching finished"
    );

    ctx.matching = Some(result);

    StageResult {
        stage: ProcessingStage::BaseModelMatching,
        success: matched,
        confidence,
        notes,
    }
}

/// Find the configured fallback-family candidate, if any.
fn fallback_candidate<'a>(
    candidates: &'a [CatalogVehicle],
    config: &MatchingConfig,
) -> Option<&'a CatalogVehicle> {
    let family = config.fallback_family.as_deref()?;
    let family = normalize_model_name(family);
    candidates
        .iter()
        .filter(|c| normalize_model_name(&c.model_family) == family)
        .max_by(|a, b| {
            a.extraction_quality
                .partial_cmp(&b.extraction_quality)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.id.cmp(&a.id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entry, vehicle};
    use lineup_scorer::LexicalScorer;

    #[tokio::test]
    async fn stores_match_and_diagnostics() {
        let mut ctx = PipelineContext::new(entry("Summit", "X with Expert Pkg", "TLTA"));
        let candidates = vec![vehicle("summit-x", "SUMMIT X WITH EXPERT PACKAGE", "SUMMIT")];
        let config = MatchingConfig::default();

        let result = run(&mut ctx, &candidates, &config, &LexicalScorer).await;
        assert!(result.success);
        assert_eq!(result.stage, ProcessingStage::BaseModelMatching);
        assert!(ctx.matched_base_model.is_some());
        assert!(ctx.matching.is_some());
        assert!(result.confidence >= 0.95);
    }

    #[tokio::test]
    async fn no_match_without_fallback_fails_stage() {
        let mut ctx = PipelineContext::new(entry("Expedition", "", "EXPA"));
        let candidates = vec![vehicle("summit-x", "SUMMIT X", "SUMMIT")];
        let config = MatchingConfig::default();

        let result = run(&mut ctx, &candidates, &config, &LexicalScorer).await;
        assert!(!result.success);
        assert!(ctx.matched_base_model.is_none());
        assert!(
            result
                .notes
                .iter()
                .any(|n| n.contains("no base model matched"))
        );
    }

    #[tokio::test]
    async fn configured_fallback_family_is_adopted() {
        let mut ctx = PipelineContext::new(entry("Expedition", "", "EXPA"));
        let mut low = vehicle("summit-sp", "SUMMIT SP", "SUMMIT");
        low.extraction_quality = 0.6;
        let candidates = vec![low, vehicle("summit-x", "SUMMIT X", "SUMMIT")];
        let config = MatchingConfig {
            fallback_family: Some("Summit".into()),
            ..MatchingConfig::default()
        };

        let result = run(&mut ctx, &candidates, &config, &LexicalScorer).await;
        assert!(result.success);
        // Best extraction quality wins among fallback candidates.
        assert_eq!(
            ctx.matched_base_model.as_ref().map(|v| v.id.as_str()),
            Some("summit-x")
        );
        assert!(result.notes.iter().any(|n| n.contains("fell back")));
        // The review flag from matching still stands.
        assert!(ctx.requires_human_review());
    }
}
