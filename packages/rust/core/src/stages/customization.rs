//! Stage 3 — customization processing.
//!
//! The model code embeds configuration tokens the catalog page never
//! mentions: displacement, fuel-injection marker, track length/type, trim
//! level. This stage pattern-matches them out of the code and records any
//! value that conflicts with an inherited one as an override with
//! `<field>_customized` / `<field>_original` markers.
//!
//! Never fatal: a short code with no recognizable tokens simply yields
//! fewer customizations.

use std::sync::LazyLock;

use regex::Regex;

use lineup_shared::{InheritanceRules, MatchingConfig, ProcessingStage, StageResult};
use tracing::debug;

use crate::context::PipelineContext;

/// Detection count at which a complex model code earns a confidence bonus.
const COMPLEX_CODE_DETECTIONS: usize = 5;
/// Bonus for a complex, information-rich model code.
const COMPLEX_CODE_BONUS: f64 = 0.05;

/// Numbers at or above this are displacements; below, track lengths.
const DISPLACEMENT_FLOOR: u32 = 300;
/// Upper bound for a plausible displacement token.
const DISPLACEMENT_CEIL: u32 = 1300;
/// Lower bound for a plausible track length token (inches).
const TRACK_LENGTH_FLOOR: u32 = 100;

/// Parse the model code for embedded configuration tokens.
pub fn run(
    ctx: &mut PipelineContext,
    _config: &MatchingConfig,
    _rules: &InheritanceRules,
) -> StageResult {
    let code = ctx.price_entry.model_code.to_uppercase();
    let tokens: Vec<&str> = tokenize(&code);

    let mut detections: Vec<(String, String)> = Vec::new();

    for token in &tokens {
        if let Some(number) = numeric_token(token) {
            if (DISPLACEMENT_FLOOR..=DISPLACEMENT_CEIL).contains(&number) {
                detections.push(("displacement".into(), format!("{number}cc")));
            } else if (TRACK_LENGTH_FLOOR..DISPLACEMENT_FLOOR).contains(&number) {
                detections.push(("track_length".into(), number.to_string()));
            }
            continue;
        }

        match *token {
            "EFI" => detections.push(("fuel_system".into(), "electronic_fuel_injection".into())),
            "ETEC" => detections.push(("fuel_system".into(), "e_tec_direct_injection".into())),
            "ACE" => detections.push(("fuel_system".into(), "ace_four_stroke".into())),
            "TRAIL" | "MOUNTAIN" | "CROSSOVER" | "UTILITY" => {
                detections.push(("track_type".into(), token.to_lowercase()));
            }
            "XRS" | "RS" | "SE" | "LE" | "SPORT" | "LTD" => {
                detections.push(("trim_level".into(), token.to_lowercase()));
            }
            _ => {}
        }
    }

    // Compound trims split by the tokenizer ("X-RS" → X, RS) reduce to the
    // stronger marker when both halves are present.
    if tokens.contains(&"X") && tokens.contains(&"RS") {
        detections.retain(|(field, value)| !(field == "trim_level" && value == "rs"));
        detections.push(("trim_level".into(), "x_rs".into()));
    }

    let mut notes = Vec::new();
    let detected_fields = detections.len();

    for (field, value) in detections {
        match inherited_counterpart(&field, ctx) {
            Some((inherited_key, inherited_value)) if !equivalent(&inherited_value, &value) => {
                // Conflict: record the override and keep the original.
                ctx.customizations.insert(field.clone(), value.clone());
                ctx.customizations
                    .insert(format!("{field}_customized"), "true".into());
                ctx.customizations
                    .insert(format!("{field}_original"), inherited_value.clone());
                notes.push(format!(
                    "customization override: {field} {inherited_value} -> {value} (inherited from {inherited_key})"
                ));
            }
            _ => {
                ctx.customizations.insert(field, value);
            }
        }
    }

    // Bonus is earned by detection count and specificity: a code dense
    // enough to describe the whole configuration corroborates the match.
    let bonus = if detected_fields >= COMPLEX_CODE_DETECTIONS {
        COMPLEX_CODE_BONUS
    } else {
        0.0
    };

    if detected_fields == 0 {
        notes.push("no configuration tokens detected in model code".into());
    }

    debug!(
        model_code = %ctx.price_entry.model_code,
        detections = detected_fields,
        bonus,
        "customization processing finished"
    );

    StageResult {
        stage: ProcessingStage::CustomizationProcessing,
        success: true,
        confidence: ctx.current_confidence + bonus,
        notes,
    }
}

/// Split a model code on its separator characters.
fn tokenize(code: &str) -> Vec<&str> {
    static SEP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-_/ ]+").expect("valid regex"));
    SEP_RE.split(code).filter(|t| !t.is_empty()).collect()
}

/// Parse a purely numeric token.
fn numeric_token(token: &str) -> Option<u32> {
    static NUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{3,4}$").expect("valid regex"));
    if NUM_RE.is_match(token) {
        token.parse().ok()
    } else {
        None
    }
}

/// Map a detected field to its inherited counterpart key, returning the
/// inherited value when present.
fn inherited_counterpart(field: &str, ctx: &PipelineContext) -> Option<(String, String)> {
    let key = match field {
        "displacement" => "engine.displacement",
        "fuel_system" => "engine.fuel_system",
        "track_length" => "dimensions.track_length",
        "track_type" => "dimensions.track_type",
        "trim_level" => return None,
        _ => return None,
    };
    ctx.inherited_specs
        .get(key)
        .map(|v| (key.to_string(), v.clone()))
}

/// Loose value equivalence: `850` and `850cc` describe the same displacement.
fn equivalent(a: &str, b: &str) -> bool {
    let strip = |s: &str| {
        s.to_lowercase()
            .trim_end_matches("cc")
            .trim()
            .to_string()
    };
    strip(a) == strip(b)
}
