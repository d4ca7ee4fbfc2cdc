//! The 5-stage specification inheritance pipeline.
//!
//! Stages always run in order over a context owned exclusively by one run:
//!
//! 1. Base model matching (wraps the tiered matcher)
//! 2. Specification inheritance
//! 3. Customization processing
//! 4. Spring options enhancement
//! 5. Final validation
//!
//! A price entry that finds no base model skips stages 2–4 and still
//! reaches final validation, which emits a flagged LOW record. Per-entry
//! failures are data for triage, never exceptions that abort a batch.

use tracing::{info, instrument};

use lineup_scorer::SimilarityScorer;
use lineup_shared::{
    CatalogVehicle, InheritanceRules, MatchMethod, MatchingConfig, MatchingResult,
    ProductSpecification, TierOutcome,
};

use crate::context::PipelineContext;
use crate::stages;

/// A finished pipeline run: the terminal record plus the matching
/// diagnostics that produced it.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// The frozen product specification.
    pub specification: ProductSpecification,
    /// Stage-1 matching diagnostics, kept for failure triage.
    pub matching: MatchingResult,
}

/// Run the full pipeline for one price entry and return the terminal record.
pub async fn run_pipeline(
    entry: lineup_shared::PriceEntry,
    candidates: &[CatalogVehicle],
    config: &MatchingConfig,
    rules: &InheritanceRules,
    scorer: &dyn SimilarityScorer,
) -> ProductSpecification {
    run_pipeline_detailed(entry, candidates, config, rules, scorer)
        .await
        .specification
}

/// Run the full pipeline and keep the matching diagnostics alongside the
/// terminal record.
#[instrument(skip_all, fields(model_code = %entry.model_code))]
pub async fn run_pipeline_detailed(
    entry: lineup_shared::PriceEntry,
    candidates: &[CatalogVehicle],
    config: &MatchingConfig,
    rules: &InheritanceRules,
    scorer: &dyn SimilarityScorer,
) -> PipelineRun {
    let mut ctx = PipelineContext::new(entry);

    // --- Stage 1: base model matching ---
    let stage1 = stages::matching::run(&mut ctx, candidates, config, scorer).await;
    let matched = stage1.success;
    ctx.record_stage(&stage1);

    // --- Stages 2–4 ---
    if matched {
        for stage in stages::MIDDLE_STAGES {
            let result = stage(&mut ctx, config, rules);
            ctx.record_stage(&result);
        }
    }

    // --- Stage 5: final validation (always runs) ---
    let (_, specification) = stages::validation::run(&mut ctx, config);

    let matching = ctx.matching.take().unwrap_or_else(|| MatchingResult {
        model_code: specification.model_code.clone(),
        tier1: TierOutcome::default(),
        tier2: TierOutcome::default(),
        tier3: TierOutcome::default(),
        final_matching_method: MatchMethod::None,
        overall_confidence: 0.0,
        requires_human_review: true,
        quality_issues: vec![],
    });

    info!(
        model_code = %specification.model_code,
        matched,
        confidence = specification.confidence_score,
        level = %specification.confidence_level,
        stages = specification.completed_stages.len(),
        "pipeline run complete"
    );

    PipelineRun {
        specification,
        matching,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entry, vehicle, vehicle_with_specs};
    use lineup_scorer::LexicalScorer;
    use lineup_shared::{ConfidenceLevel, ProcessingStage, SpringOptionType};

    fn config() -> MatchingConfig {
        MatchingConfig::default()
    }

    fn rules() -> InheritanceRules {
        InheritanceRules::default()
    }

    #[tokio::test]
    async fn matched_entry_runs_all_five_stages() {
        let e = entry("Summit", "X with Expert Pkg", "TLTA");
        let candidates = vec![vehicle_with_specs("summit-x")];

        let spec =
            run_pipeline(e, &candidates, &config(), &rules(), &LexicalScorer).await;

        assert_eq!(spec.completed_stages, ProcessingStage::ALL.to_vec());
        assert_eq!(spec.base_model_id.as_deref(), Some("summit-x"));
        assert!(!spec.specifications.is_empty());
        assert_eq!(spec.confidence_level, ConfidenceLevel::High);
        assert!(!spec.requires_human_review);
    }

    #[tokio::test]
    async fn dense_code_flows_through_customization_and_options() {
        let mut e = entry("MXZ", "", "MXZA");
        e.model_code = "MXZ_TRAIL_COBRA_800_EFI".into();
        let candidates = vec![vehicle("mxz-trail", "MXZ TRAIL", "MXZ")];

        let spec =
            run_pipeline(e, &candidates, &config(), &rules(), &LexicalScorer).await;

        assert_eq!(spec.customizations["displacement"], "800cc");
        assert_eq!(
            spec.customizations["fuel_system"],
            "electronic_fuel_injection"
        );
        assert!(spec.customizations["track_type"].contains("trail"));
        assert!(spec.spring_options.iter().any(|o| {
            o.option_type == SpringOptionType::TrackUpgrade && o.description.contains("Cobra")
        }));
        // Overrides landed in the merged tree.
        assert_eq!(spec.specifications["engine.displacement"], "800cc");
    }

    #[tokio::test]
    async fn sparse_entry_still_succeeds_with_empty_payloads() {
        let e = entry("Summit", "X with Expert Pkg", "TLTA");
        let candidates = vec![vehicle("summit-x", "SUMMIT X WITH EXPERT PACKAGE", "SUMMIT")];

        let spec =
            run_pipeline(e, &candidates, &config(), &rules(), &LexicalScorer).await;

        // Zero customizations and zero spring options is success, not error.
        assert!(spec.customizations.is_empty());
        assert!(spec.spring_options.is_empty());
        assert_eq!(spec.completed_stages, ProcessingStage::ALL.to_vec());
        assert!(
            spec.validation_notes
                .iter()
                .any(|n| n.contains("neutral stage confidence 0.5"))
        );
    }

    #[tokio::test]
    async fn unmatched_entry_skips_middle_stages_but_emits_low_record() {
        let e = entry("Expedition", "", "EXPA");
        let candidates = vec![vehicle("summit-x", "SUMMIT X", "SUMMIT")];

        let run = run_pipeline_detailed(e, &candidates, &config(), &rules(), &LexicalScorer)
            .await;
        let spec = run.specification;

        assert_eq!(
            spec.completed_stages,
            vec![
                ProcessingStage::BaseModelMatching,
                ProcessingStage::FinalValidation
            ]
        );
        assert!(spec.base_model_id.is_none());
        assert_eq!(spec.confidence_level, ConfidenceLevel::Low);
        assert!(spec.requires_human_review);
        assert_eq!(run.matching.final_matching_method, MatchMethod::None);
    }

    #[tokio::test]
    async fn review_flag_survives_to_the_terminal_record() {
        // A normalized-tier match below the auto-accept threshold: found,
        // but flagged. The terminal record must not classify HIGH.
        let e = entry("Summit", "X with Expert Pkg", "TLTA");
        let candidates = vec![vehicle("summit-e", "SUMMIT Expert Package", "")];

        let run = run_pipeline_detailed(e, &candidates, &config(), &rules(), &LexicalScorer)
            .await;

        assert!(run.matching.requires_human_review);
        assert!(run.specification.requires_human_review);
        assert_ne!(
            run.specification.confidence_level,
            ConfidenceLevel::High
        );
    }

    #[tokio::test]
    async fn confidence_stays_bounded_through_all_stages() {
        let mut e = entry("Summit", "X with Expert Pkg", "SUMA");
        e.model_code = "SUMMIT_X_RS_850_ETEC_154_MOUNTAIN_SE_COBRA_CARGO".into();
        let candidates = vec![vehicle_with_specs("summit-x")];

        let spec =
            run_pipeline(e, &candidates, &config(), &rules(), &LexicalScorer).await;

        assert!((0.0..=1.0).contains(&spec.confidence_score));
    }
}
