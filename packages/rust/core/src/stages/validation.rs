//! Stage 5 — final validation.
//!
//! Cross-checks required fields, merges inherited specs with customization
//! overrides, classifies the confidence level, and freezes the context into
//! the terminal [`ProductSpecification`]. Always runs, even when stage 1
//! found nothing; inconsistencies downgrade confidence, never raise it, and
//! are recorded as validation notes rather than thrown.

use lineup_shared::{
    ConfidenceLevel, LineupError, MatchingConfig, ProcessingStage, ProductSpecification,
    StageResult,
};
use tracing::debug;

use crate::context::PipelineContext;

/// Confidence penalty per detected inconsistency or missing required field.
const INCONSISTENCY_PENALTY: f64 = 0.1;

/// Validate, merge, and freeze the terminal product specification.
pub fn run(
    ctx: &mut PipelineContext,
    _config: &MatchingConfig,
) -> (StageResult, ProductSpecification) {
    let mut notes = Vec::new();
    let mut confidence = ctx.current_confidence;

    // Required-field cross-checks. Each miss is a note and a downgrade.
    let entry = ctx.price_entry.clone();
    let mut required_missing = 0usize;
    for (present, description) in [
        (!entry.model_code.is_empty(), "model code"),
        (!entry.brand.is_empty(), "brand"),
        (entry.model_year > 0, "model year"),
        (entry.price > 0.0, "positive price"),
        (!entry.currency.is_empty(), "currency"),
    ] {
        if !present {
            required_missing += 1;
            notes.push(format!("required field missing: {description}"));
        }
    }
    confidence -= required_missing as f64 * INCONSISTENCY_PENALTY;

    if ctx.matched_base_model.is_none() {
        let err = LineupError::MissingBaseModel {
            model_code: entry.model_code.clone(),
        };
        notes.push(format!("flagged for review: {err}"));
    }

    // Merge: inherited specs first, customization overrides on top.
    let mut specifications = ctx.inherited_specs.clone();
    for (field, value) in &ctx.customizations {
        if field.ends_with("_customized") || field.ends_with("_original") {
            continue;
        }
        let key = merged_key(field);
        specifications.insert(key, value.clone());
    }

    // An override recorded without its original marker means the merge
    // lost track of what it replaced.
    for field in ctx.customizations.keys() {
        if let Some(base_field) = field.strip_suffix("_customized") {
            if !ctx
                .customizations
                .contains_key(&format!("{base_field}_original"))
            {
                let err = LineupError::InconsistentSpecification {
                    message: format!("override of {base_field} lost its original value"),
                };
                notes.push(err.to_string());
                confidence -= INCONSISTENCY_PENALTY;
            }
        }
    }

    // Spring options must carry sane confidences.
    for option in &ctx.spring_options {
        if !(0.0..=1.0).contains(&option.confidence) {
            let err = LineupError::InconsistentSpecification {
                message: format!(
                    "spring option {} has out-of-range confidence {}",
                    option.option_type, option.confidence
                ),
            };
            notes.push(err.to_string());
            confidence -= INCONSISTENCY_PENALTY;
        }
    }

    let confidence = confidence.clamp(0.0, 1.0);
    let review = ctx.requires_human_review();

    // A record flagged for review at matching time must never surface as
    // HIGH, whatever the numeric score says.
    let mut level = ConfidenceLevel::from_score(confidence);
    if review && level == ConfidenceLevel::High {
        level = ConfidenceLevel::Medium;
        notes.push("human review required: confidence level capped at medium".into());
    }

    let stage_result = StageResult {
        stage: ProcessingStage::FinalValidation,
        success: true,
        confidence,
        notes: notes.clone(),
    };
    ctx.record_stage(&stage_result);

    let specification = ProductSpecification {
        model_code: entry.model_code.clone(),
        processing_id: ctx.processing_id,
        brand: entry.brand.clone(),
        model_year: entry.model_year,
        price: entry.price,
        currency: entry.currency.clone(),
        base_model_id: ctx.matched_base_model.as_ref().map(|v| v.id.clone()),
        base_model_name: ctx
            .matched_base_model
            .as_ref()
            .map(|v| v.display_name.clone()),
        specifications,
        customizations: ctx.customizations.clone(),
        spring_options: ctx.spring_options.clone(),
        confidence_score: confidence,
        confidence_level: level,
        completed_stages: ctx.completed_stages.clone(),
        validation_notes: ctx.validation_notes.clone(),
        requires_human_review: review,
    };

    debug!(
        model_code = %specification.model_code,
        confidence = specification.confidence_score,
        level = %specification.confidence_level,
        "final validation finished"
    );

    (stage_result, specification)
}

/// Map a customization field onto its merged-tree key.
fn merged_key(field: &str) -> String {
    match field {
        "displacement" | "fuel_system" => format!("engine.{field}"),
        "track_length" | "track_type" => format!("dimensions.{field}"),
        "trim_level" => "trim_level".into(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entry, matching_result, vehicle_with_specs};

    #[test]
    fn merges_overrides_into_the_spec_tree() {
        let mut ctx = PipelineContext::new(entry("MXZ", "", "MXZA"));
        ctx.matched_base_model = Some(vehicle_with_specs("mxz-x"));
        ctx.matching = Some(matching_result("MXZA", 0.95, false));
        ctx.current_confidence = 0.95;
        ctx.inherited_specs
            .insert("engine.displacement".into(), "850".into());
        ctx.customizations.insert("displacement".into(), "800cc".into());
        ctx.customizations
            .insert("displacement_customized".into(), "true".into());
        ctx.customizations
            .insert("displacement_original".into(), "850".into());

        let (result, spec) = run(&mut ctx, &MatchingConfig::default());

        assert!(result.success);
        assert_eq!(spec.specifications["engine.displacement"], "800cc");
        assert_eq!(spec.customizations["displacement_original"], "850");
        assert_eq!(spec.confidence_level, ConfidenceLevel::High);
        assert!(!spec.requires_human_review);
    }

    #[test]
    fn reviewed_match_is_never_high() {
        let mut ctx = PipelineContext::new(entry("Summit", "", "SUMA"));
        ctx.matched_base_model = Some(vehicle_with_specs("summit-x"));
        ctx.matching = Some(matching_result("SUMA", 0.95, true));
        ctx.current_confidence = 0.95;

        let (_, spec) = run(&mut ctx, &MatchingConfig::default());

        assert!(spec.requires_human_review);
        assert_eq!(spec.confidence_level, ConfidenceLevel::Medium);
        assert!(
            spec.validation_notes
                .iter()
                .any(|n| n.contains("capped at medium"))
        );
    }

    #[test]
    fn missing_base_model_stays_flagged_low() {
        let mut ctx = PipelineContext::new(entry("Expedition", "", "EXPA"));
        ctx.matching = Some(matching_result("EXPA", 0.3, true));
        ctx.current_confidence = 0.3;

        let (_, spec) = run(&mut ctx, &MatchingConfig::default());

        assert!(spec.base_model_id.is_none());
        assert_eq!(spec.confidence_level, ConfidenceLevel::Low);
        assert!(spec.requires_human_review);
        assert!(
            spec.validation_notes
                .iter()
                .any(|n| n.contains("no base model matched"))
        );
    }

    #[test]
    fn lost_original_marker_is_an_inconsistency() {
        let mut ctx = PipelineContext::new(entry("MXZ", "", "MXZA"));
        ctx.matched_base_model = Some(vehicle_with_specs("mxz-x"));
        ctx.matching = Some(matching_result("MXZA", 0.95, false));
        ctx.current_confidence = 0.95;
        ctx.customizations.insert("displacement".into(), "800cc".into());
        ctx.customizations
            .insert("displacement_customized".into(), "true".into());
        // No displacement_original: the merge lost the replaced value.

        let (_, spec) = run(&mut ctx, &MatchingConfig::default());

        assert!(spec.confidence_score < 0.95);
        assert!(
            spec.validation_notes
                .iter()
                .any(|n| n.contains("inconsistent specification"))
        );
    }

    #[test]
    fn missing_required_fields_downgrade() {
        let mut e = entry("Summit", "", "SUMA");
        e.price = 0.0;
        e.currency = String::new();
        let mut ctx = PipelineContext::new(e);
        ctx.matched_base_model = Some(vehicle_with_specs("summit-x"));
        ctx.matching = Some(matching_result("SUMA", 0.95, false));
        ctx.current_confidence = 0.95;

        let (_, spec) = run(&mut ctx, &MatchingConfig::default());

        assert!(spec.confidence_score <= 0.75);
        assert_eq!(
            spec.validation_notes
                .iter()
                .filter(|n| n.contains("required field missing"))
                .count(),
            2
        );
    }
}
