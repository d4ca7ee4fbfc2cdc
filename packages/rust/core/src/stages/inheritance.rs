//! Stage 2 — specification inheritance.
//!
//! Copies the matched base model's specification groups into the context
//! under dotted keys (`engine.displacement`, `dimensions.track_length`, ...),
//! then layers on the configured rule tables: brand-specific field
//! overrides, model-year feature sets, and price-tier feature sets.
//!
//! Only fatal when stage 1 left no base model; otherwise the stage always
//! succeeds, possibly with partial specs.

use lineup_shared::{InheritanceRules, MatchingConfig, ProcessingStage, StageResult};
use tracing::debug;

use crate::context::PipelineContext;

/// Confidence bonus when inheritance populated a substantial spec tree.
const RICH_SPECS_BONUS: f64 = 0.05;
/// Confidence bonus when inheritance populated anything at all.
const PARTIAL_SPECS_BONUS: f64 = 0.02;
/// Field count at which the spec tree counts as substantial.
const RICH_SPECS_FIELD_COUNT: usize = 5;

/// Inherit the base model's specification groups and apply rule tables.
pub fn run(
    ctx: &mut PipelineContext,
    _config: &MatchingConfig,
    rules: &InheritanceRules,
) -> StageResult {
    let Some(base) = ctx.matched_base_model.clone() else {
        return StageResult {
            stage: ProcessingStage::SpecificationInheritance,
            success: false,
            confidence: ctx.current_confidence,
            notes: vec!["specification inheritance skipped: no base model".into()],
        };
    };

    let specs = &mut ctx.inherited_specs;

    for (key, value) in &base.specifications.engine {
        specs.insert(format!("engine.{key}"), value.clone());
    }
    for (key, value) in &base.specifications.dimensions {
        specs.insert(format!("dimensions.{key}"), value.clone());
    }
    for (key, value) in &base.specifications.suspension {
        specs.insert(format!("suspension.{key}"), value.clone());
    }
    for feature in &base.specifications.features {
        specs.insert(format!("features.{feature}"), "standard".into());
    }
    if !base.specifications.colors.is_empty() {
        specs.insert(
            "colors.available".into(),
            base.specifications.colors.join(", "),
        );
    }
    if !base.specifications.spring_options.is_empty() {
        specs.insert(
            "spring_options.factory".into(),
            base.specifications.spring_options.join("; "),
        );
    }

    let mut notes = Vec::new();
    let entry = &ctx.price_entry;

    // Brand-specific field overrides (e.g. drivetrain naming).
    for rule in &rules.brand_rules {
        if rule.brand.eq_ignore_ascii_case(&entry.brand) {
            specs.insert(rule.field.clone(), rule.value.clone());
            notes.push(format!("brand rule applied: {} = {}", rule.field, rule.value));
        }
    }

    // Model-year feature sets.
    for rule in &rules.year_features {
        if entry.model_year >= rule.min_year {
            for feature in &rule.features {
                specs.insert(format!("features.{feature}"), "standard".into());
            }
        }
    }

    // Price-tier feature sets (heated grips, electric reverse, ...).
    for rule in &rules.price_tiers {
        if entry.price >= rule.min_price {
            for feature in &rule.features {
                specs.insert(format!("features.{feature}"), "standard".into());
            }
        }
    }

    // Evidence-tied bonus: a populated spec tree supports the match; an
    // empty one leaves confidence untouched.
    let bonus = if specs.len() >= RICH_SPECS_FIELD_COUNT {
        RICH_SPECS_BONUS
    } else if !specs.is_empty() {
        PARTIAL_SPECS_BONUS
    } else {
        notes.push("base model carried no specification groups".into());
        0.0
    };

    debug!(
        model_code = %ctx.price_entry.model_code,
        inherited_fields = ctx.inherited_specs.len(),
        bonus,
        "specification inheritance finished"
    );

    StageResult {
        stage: ProcessingStage::SpecificationInheritance,
        success: true,
        confidence: ctx.current_confidence + bonus,
        notes,
    }
}
