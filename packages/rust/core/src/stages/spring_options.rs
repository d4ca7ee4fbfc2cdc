//! Stage 4 — spring options enhancement.
//!
//! Scans the model code, the price row's spring-option column, and the
//! accumulated customizations for option-indicating keywords, turning them
//! into typed [`SpringOption`]s. Same-type options with overlapping
//! descriptions are deduplicated before landing in the context.
//!
//! Never fatal: zero detected options is a valid outcome and contributes
//! the neutral 0.5 stage confidence, leaving the context confidence as-is.

use lineup_shared::{
    InheritanceRules, MatchingConfig, ProcessingStage, SpringOption, SpringOptionType,
    StageResult,
};
use tracing::debug;

use crate::context::PipelineContext;

/// Stage confidence reported when nothing was detected.
const NEUTRAL_STAGE_CONFIDENCE: f64 = 0.5;
/// Context confidence bonus per detected option.
const PER_OPTION_BONUS: f64 = 0.02;
/// Cap on the total spring-option bonus.
const MAX_OPTIONS_BONUS: f64 = 0.06;

/// Detection confidence for keywords found in the model code.
const CODE_DETECTION_CONFIDENCE: f64 = 0.75;
/// Detection confidence for the explicit spring-option column.
const COLUMN_DETECTION_CONFIDENCE: f64 = 0.85;

/// Keyword table: (keyword, option type) pairs scanned against every source.
const KEYWORDS: &[(&str, SpringOptionType)] = &[
    // Mountain / deep-snow track hardware
    ("COBRA", SpringOptionType::TrackUpgrade),
    ("POWDERMAX", SpringOptionType::TrackUpgrade),
    ("ICE RIPPER", SpringOptionType::TrackUpgrade),
    ("MOUNTAIN", SpringOptionType::TrackUpgrade),
    // Electronic / gas suspension packages
    ("SMART-SHOX", SpringOptionType::SuspensionUpgrade),
    ("SMARTSHOX", SpringOptionType::SuspensionUpgrade),
    ("KYB", SpringOptionType::SuspensionUpgrade),
    ("AIR RIDE", SpringOptionType::SuspensionUpgrade),
    // Comfort and performance markers
    ("PREMIUM", SpringOptionType::ComfortUpgrade),
    ("LUXE", SpringOptionType::ComfortUpgrade),
    ("EXTREME", SpringOptionType::PerformanceUpgrade),
    ("TURBO", SpringOptionType::PerformanceUpgrade),
    ("COMPETITION", SpringOptionType::PerformanceUpgrade),
    // Weather and storage
    ("WINDSHIELD", SpringOptionType::WeatherProtection),
    ("WEATHER", SpringOptionType::WeatherProtection),
    ("CARGO", SpringOptionType::StorageUpgrade),
    ("LINQ", SpringOptionType::StorageUpgrade),
    ("RACK", SpringOptionType::StorageUpgrade),
];

/// Color terms that mark a spring-order color change.
const COLOR_TERMS: &[&str] = &[
    "BLACK", "WHITE", "RED", "BLUE", "GREEN", "YELLOW", "ORANGE", "NEO",
];

/// Detect spring options from the model code and accumulated customizations.
pub fn run(
    ctx: &mut PipelineContext,
    _config: &MatchingConfig,
    _rules: &InheritanceRules,
) -> StageResult {
    let mut detected: Vec<SpringOption> = Vec::new();

    let code = ctx.price_entry.model_code.to_uppercase();
    let column = ctx.price_entry.spring_option.to_uppercase();
    let track = ctx.price_entry.track.to_uppercase();

    for (keyword, option_type) in KEYWORDS {
        if code.contains(keyword) || track.contains(keyword) {
            detected.push(SpringOption {
                option_type: *option_type,
                description: format!("{} detected in model code", title_case(keyword)),
                confidence: CODE_DETECTION_CONFIDENCE,
                price_impact: None,
            });
        }
        if column.contains(keyword) {
            detected.push(SpringOption {
                option_type: *option_type,
                description: format!("{} listed as spring option", title_case(keyword)),
                confidence: COLUMN_DETECTION_CONFIDENCE,
                price_impact: None,
            });
        }
    }

    // Customization values can also indicate options (e.g. a mountain track
    // type detected from the code).
    for (field, value) in &ctx.customizations {
        if field == "track_type" && value.eq_ignore_ascii_case("mountain") {
            detected.push(SpringOption {
                option_type: SpringOptionType::TrackUpgrade,
                description: "Mountain track type customization".into(),
                confidence: CODE_DETECTION_CONFIDENCE,
                price_impact: None,
            });
        }
    }

    // A color named in the spring-option column is a color change order.
    if !column.is_empty() {
        for term in COLOR_TERMS {
            if column.contains(term) {
                detected.push(SpringOption {
                    option_type: SpringOptionType::ColorChange,
                    description: format!("{} color listed as spring option", title_case(term)),
                    confidence: COLUMN_DETECTION_CONFIDENCE,
                    price_impact: None,
                });
                break;
            }
        }
    }

    let deduped = dedupe(detected);
    let count = deduped.len();
    ctx.spring_options.extend(deduped);

    let bonus = (count as f64 * PER_OPTION_BONUS).min(MAX_OPTIONS_BONUS);
    let mut notes = Vec::new();
    if count == 0 {
        notes.push(format!(
            "no spring options detected (neutral stage confidence {NEUTRAL_STAGE_CONFIDENCE})"
        ));
    } else {
        notes.push(format!("{count} spring option(s) detected"));
    }

    debug!(
        model_code = %ctx.price_entry.model_code,
        options = count,
        bonus,
        "spring options enhancement finished"
    );

    StageResult {
        stage: ProcessingStage::SpringOptionsEnhancement,
        success: true,
        confidence: ctx.current_confidence + bonus,
        notes,
    }
}

/// Drop same-type options whose descriptions overlap, keeping the highest
/// detection confidence.
fn dedupe(mut options: Vec<SpringOption>) -> Vec<SpringOption> {
    options.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<SpringOption> = Vec::new();
    for option in options {
        let overlaps = kept.iter().any(|k| {
            k.option_type == option.option_type
                && descriptions_overlap(&k.description, &option.description)
        });
        if !overlaps {
            kept.push(option);
        }
    }
    kept
}

/// Two descriptions overlap when they share a leading keyword token.
fn descriptions_overlap(a: &str, b: &str) -> bool {
    match (a.split_whitespace().next(), b.split_whitespace().next()) {
        (Some(first_a), Some(first_b)) => first_a.eq_ignore_ascii_case(first_b),
        _ => false,
    }
}

/// `COBRA` → `Cobra` for readable descriptions.
fn title_case(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
