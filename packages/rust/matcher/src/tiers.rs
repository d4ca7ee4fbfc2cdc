//! The three escalating comparison tiers.
//!
//! Each tier is a pure function over (entry, candidates, config) returning
//! the best candidate index it found and a [`TierOutcome`] with its evidence.
//! Tier 3 additionally takes the injected similarity scorer and is the only
//! tier that can suspend.
//!
//! Candidate ties are broken identically in every tier: higher source
//! extraction quality first, then lexical order of the candidate id.

use std::collections::BTreeMap;

use lineup_normalizer::{normalize_engine_spec, normalize_model_name, normalize_package_name};
use lineup_scorer::SimilarityScorer;
use lineup_shared::{CatalogVehicle, LineupError, MatchingConfig, PriceEntry, TierOutcome};
use tracing::debug;

/// A tier's evaluation: its diagnostic outcome plus the index of the best
/// candidate (when any candidate scored above zero).
#[derive(Debug, Clone)]
pub struct TierEval {
    pub outcome: TierOutcome,
    pub best: Option<usize>,
}

// ---------------------------------------------------------------------------
// Tier 1 — Exact
// ---------------------------------------------------------------------------

/// Raw comparison: case-folded substring containment with no abbreviation
/// expansion. A candidate hits only when both its family banner and its
/// display name contain the entry's model name.
pub fn tier1_exact(
    entry: &PriceEntry,
    candidates: &[CatalogVehicle],
    config: &MatchingConfig,
) -> TierEval {
    let model = fold_case(&entry.model);
    if model.is_empty() {
        return TierEval {
            outcome: TierOutcome {
                attempted: true,
                hit: false,
                confidence: 0.0,
                evidence: BTreeMap::from([
                    ("comparison".to_string(), "raw_containment".to_string()),
                    ("status".to_string(), "no model name on entry".to_string()),
                ]),
            },
            best: None,
        };
    }

    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        let family_contains =
            !candidate.model_family.is_empty() && fold_case(&candidate.model_family).contains(&model);
        let name_contains = fold_case(&candidate.display_name).contains(&model);

        let confidence = match (family_contains, name_contains) {
            (true, true) => 1.0,
            (true, false) | (false, true) => 0.5,
            (false, false) => 0.0,
        };
        best = prefer(best, idx, confidence, candidates);
    }

    let (confidence, best_idx) = best
        .map(|(idx, conf)| (conf, Some(idx)))
        .unwrap_or((0.0, None));

    let mut evidence = BTreeMap::from([(
        "comparison".to_string(),
        "raw_containment".to_string(),
    )]);
    if let Some(idx) = best_idx {
        evidence.insert("matched_id".into(), candidates[idx].id.clone());
    }

    TierEval {
        outcome: TierOutcome {
            attempted: true,
            hit: confidence >= config.exact_match_threshold,
            confidence,
            evidence,
        },
        best: best_idx,
    }
}

// ---------------------------------------------------------------------------
// Tier 2 — Normalized
// ---------------------------------------------------------------------------

/// Normalized comparison: both sides run through the text normalizer, then
/// the model must be contained in the candidate's family or name, and each
/// further field present on the entry (package, engine) adds credit when its
/// tokens are covered by the candidate.
pub fn tier2_normalized(
    entry: &PriceEntry,
    candidates: &[CatalogVehicle],
    config: &MatchingConfig,
) -> TierEval {
    let model = effective_model(entry);
    let package = effective_package(entry);
    let engine = effective_engine(entry);

    let mut best: Option<(usize, f64)> = None;
    let mut best_fields = String::new();

    for (idx, candidate) in candidates.iter().enumerate() {
        let family = normalize_model_name(&candidate.model_family);
        let name = normalize_model_name(&candidate.display_name);

        let model_matched =
            !model.is_empty() && (family.contains(&model) || name.contains(&model));

        let mut checked = 1usize;
        let mut matched = usize::from(model_matched);
        let mut fields = if model_matched {
            vec!["model"]
        } else {
            vec![]
        };

        if !package.is_empty() {
            checked += 1;
            if name.contains(&package) || tokens_covered(&package, &name) {
                matched += 1;
                fields.push("package");
            }
        }

        if !engine.is_empty() {
            checked += 1;
            if engine_covered(&engine, &name, candidate) {
                matched += 1;
                fields.push("engine");
            }
        }

        // The model is the anchor: without it, partial package/engine overlap
        // stays well below the tier threshold.
        let fraction = matched as f64 / checked as f64;
        let confidence = if model_matched {
            0.7 + 0.3 * fraction
        } else {
            0.3 * fraction
        };

        let prev_best = best.map(|(i, _)| i);
        best = prefer(best, idx, confidence, candidates);
        if best.map(|(i, _)| i) != prev_best {
            best_fields = fields.join(",");
        }
    }

    let (confidence, best_idx) = best
        .map(|(idx, conf)| (conf, Some(idx)))
        .unwrap_or((0.0, None));

    let mut evidence = BTreeMap::from([
        ("comparison".to_string(), "normalized_containment".to_string()),
        ("normalized_model".to_string(), model),
    ]);
    if !package.is_empty() {
        evidence.insert("normalized_package".into(), package);
    }
    if !engine.is_empty() {
        evidence.insert("normalized_engine".into(), engine);
    }
    if let Some(idx) = best_idx {
        evidence.insert("matched_id".into(), candidates[idx].id.clone());
        evidence.insert("fields_matched".into(), best_fields);
    }

    TierEval {
        outcome: TierOutcome {
            attempted: true,
            hit: confidence >= config.normalized_match_threshold,
            confidence,
            evidence,
        },
        best: best_idx,
    }
}

// ---------------------------------------------------------------------------
// Tier 3 — Fuzzy / semantic
// ---------------------------------------------------------------------------

/// Delegate to the injected similarity scorer over (entry text, candidate
/// text) pairs. Cross-family similarity is down-weighted: a high textual
/// similarity across model families is weaker evidence than the same score
/// within one family.
///
/// A failing scorer yields an unattempted-looking outcome with an
/// `unavailable` marker; the caller records a quality issue and falls
/// through to no-match for this tier only.
pub async fn tier3_semantic(
    entry: &PriceEntry,
    candidates: &[CatalogVehicle],
    config: &MatchingConfig,
    scorer: &dyn SimilarityScorer,
) -> TierEval {
    let entry_text = entry_comparison_text(entry);
    let model = effective_model(entry);
    let threshold = tier3_threshold(config, scorer);

    let mut best: Option<(usize, f64)> = None;
    let mut best_raw = 0.0;
    let mut best_same_family = true;

    for (idx, candidate) in candidates.iter().enumerate() {
        let candidate_text = candidate_comparison_text(candidate);

        let raw = match scorer.score(&entry_text, &candidate_text).await {
            Ok(similarity) => similarity,
            Err(LineupError::ScorerUnavailable { reason }) => {
                debug!(%reason, "tier 3 scorer unavailable");
                return TierEval {
                    outcome: TierOutcome {
                        attempted: true,
                        hit: false,
                        confidence: 0.0,
                        evidence: BTreeMap::from([
                            ("comparison".to_string(), "similarity_scorer".to_string()),
                            ("scorer_id".to_string(), scorer.id().to_string()),
                            ("status".to_string(), "unavailable".to_string()),
                            ("reason".to_string(), reason),
                        ]),
                    },
                    best: None,
                };
            }
            Err(other) => {
                debug!(error = %other, "tier 3 scorer error");
                return TierEval {
                    outcome: TierOutcome {
                        attempted: true,
                        hit: false,
                        confidence: 0.0,
                        evidence: BTreeMap::from([
                            ("comparison".to_string(), "similarity_scorer".to_string()),
                            ("scorer_id".to_string(), scorer.id().to_string()),
                            ("status".to_string(), "unavailable".to_string()),
                            ("reason".to_string(), other.to_string()),
                        ]),
                    },
                    best: None,
                };
            }
        };

        let same_family = same_family(&model, candidate);
        let adjusted = if same_family {
            raw
        } else {
            raw * config.cross_family_penalty
        };

        let prev_best = best.map(|(i, _)| i);
        best = prefer(best, idx, adjusted, candidates);
        if best.map(|(i, _)| i) != prev_best {
            best_raw = raw;
            best_same_family = same_family;
        }
    }

    let (confidence, best_idx) = best
        .map(|(idx, conf)| (conf, Some(idx)))
        .unwrap_or((0.0, None));

    let mut evidence = BTreeMap::from([
        ("comparison".to_string(), "similarity_scorer".to_string()),
        ("scorer_id".to_string(), scorer.id().to_string()),
    ]);
    if let Some(idx) = best_idx {
        evidence.insert("matched_id".into(), candidates[idx].id.clone());
        evidence.insert("similarity".into(), format!("{best_raw:.4}"));
        evidence.insert("adjusted_similarity".into(), format!("{confidence:.4}"));
        evidence.insert("same_family".into(), best_same_family.to_string());
    }

    TierEval {
        outcome: TierOutcome {
            attempted: true,
            hit: confidence >= threshold,
            confidence,
            evidence,
        },
        best: best_idx,
    }
}

/// Threshold tier 3 must clear: the lexical fallback gets the lower floor.
pub fn tier3_threshold(config: &MatchingConfig, scorer: &dyn SimilarityScorer) -> f64 {
    if scorer.id() == lineup_scorer::LEXICAL_SCORER_ID {
        config.lexical_floor
    } else {
        config.fuzzy_match_threshold
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Case-fold and collapse whitespace without any other transformation.
/// Tier 1 deliberately skips abbreviation expansion.
fn fold_case(s: &str) -> String {
    s.to_uppercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized model, preferring the extraction layer's precomputed form.
fn effective_model(entry: &PriceEntry) -> String {
    if entry.normalized.model.is_empty() {
        normalize_model_name(&entry.model)
    } else {
        entry.normalized.model.clone()
    }
}

/// Normalized package, preferring the precomputed form.
fn effective_package(entry: &PriceEntry) -> String {
    if entry.normalized.package.is_empty() {
        normalize_package_name(&entry.package)
    } else {
        entry.normalized.package.clone()
    }
}

/// Normalized engine, preferring the precomputed form.
fn effective_engine(entry: &PriceEntry) -> String {
    if entry.normalized.engine.is_empty() {
        normalize_engine_spec(&entry.engine)
    } else {
        entry.normalized.engine.clone()
    }
}

/// The entry side of a tier-3 comparison: normalized model, package, and
/// engine joined into one text.
fn entry_comparison_text(entry: &PriceEntry) -> String {
    let parts = [
        effective_model(entry),
        effective_package(entry),
        effective_engine(entry),
    ];
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The candidate side of a tier-3 comparison: its normalized display name.
fn candidate_comparison_text(candidate: &CatalogVehicle) -> String {
    normalize_model_name(&candidate.display_name)
}

/// Whether the candidate belongs to the same model family as the entry.
/// An empty family banner counts as unknown, not as a mismatch.
fn same_family(normalized_model: &str, candidate: &CatalogVehicle) -> bool {
    if candidate.model_family.is_empty() || normalized_model.is_empty() {
        return true;
    }
    let family = normalize_model_name(&candidate.model_family);
    family.contains(normalized_model) || normalized_model.contains(&family)
}

/// Every whitespace token of `needle` appears as a token of `haystack`.
fn tokens_covered(needle: &str, haystack: &str) -> bool {
    let hay: std::collections::BTreeSet<&str> = haystack.split_whitespace().collect();
    needle.split_whitespace().all(|t| hay.contains(t))
}

/// Engine fields may live in the candidate's engine spec group rather than
/// its display name.
fn engine_covered(engine: &str, name: &str, candidate: &CatalogVehicle) -> bool {
    if name.contains(engine) || tokens_covered(engine, name) {
        return true;
    }
    let group_text = candidate
        .specifications
        .engine
        .values()
        .map(|v| normalize_engine_spec(v))
        .collect::<Vec<_>>()
        .join(" ");
    !group_text.is_empty() && tokens_covered(engine, &group_text)
}

/// Keep the better of the current best and a new candidate score.
/// Ties prefer higher extraction quality, then lexical id order.
fn prefer(
    best: Option<(usize, f64)>,
    idx: usize,
    confidence: f64,
    candidates: &[CatalogVehicle],
) -> Option<(usize, f64)> {
    if confidence <= 0.0 {
        return best;
    }
    match best {
        None => Some((idx, confidence)),
        Some((best_idx, best_conf)) => {
            if confidence > best_conf {
                Some((idx, confidence))
            } else if confidence == best_conf && tie_break(&candidates[idx], &candidates[best_idx])
            {
                Some((idx, confidence))
            } else {
                Some((best_idx, best_conf))
            }
        }
    }
}

/// True when `a` wins the tie against `b`.
fn tie_break(a: &CatalogVehicle, b: &CatalogVehicle) -> bool {
    if a.extraction_quality != b.extraction_quality {
        return a.extraction_quality > b.extraction_quality;
    }
    a.id < b.id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(model: &str, package: &str) -> PriceEntry {
        PriceEntry {
            model_code: "TLTA".into(),
            model: model.into(),
            package: package.into(),
            engine: String::new(),
            track: String::new(),
            starter: String::new(),
            display: String::new(),
            spring_option: String::new(),
            color: String::new(),
            normalized: Default::default(),
            price: 14_000.0,
            currency: "EUR".into(),
            model_year: 2025,
            brand: "SKI-DOO".into(),
            source_file: "pricelist.pdf".into(),
            source_page: 3,
            extraction_confidence: 0.95,
        }
    }

    fn vehicle(id: &str, name: &str, family: &str) -> CatalogVehicle {
        CatalogVehicle {
            id: id.into(),
            display_name: name.into(),
            model_family: family.into(),
            package_name: String::new(),
            specifications: Default::default(),
            source_catalog: "catalog.pdf".into(),
            source_page: 10,
            extraction_quality: 0.9,
        }
    }

    #[test]
    fn tier1_requires_family_and_name() {
        let e = entry("Summit", "X with Expert Pkg");
        let full = vehicle("summit-x", "SUMMIT X WITH EXPERT PACKAGE", "SUMMIT");
        let config = MatchingConfig::default();

        let eval = tier1_exact(&e, std::slice::from_ref(&full), &config);
        assert!(eval.outcome.hit);
        assert_eq!(eval.outcome.confidence, 1.0);
        assert_eq!(eval.best, Some(0));

        // Name matches but the family banner is missing: half credit, no hit.
        let partial = vehicle("summit-e", "SUMMIT Expert Package", "");
        let eval = tier1_exact(&e, std::slice::from_ref(&partial), &config);
        assert!(!eval.outcome.hit);
        assert_eq!(eval.outcome.confidence, 0.5);
    }

    #[test]
    fn tier2_model_only_clears_threshold() {
        let e = entry("Summit", "X with Expert Pkg");
        let candidate = vehicle("summit-e", "SUMMIT Expert Package", "");
        let config = MatchingConfig::default();

        let eval = tier2_normalized(&e, std::slice::from_ref(&candidate), &config);
        assert!(eval.outcome.hit);
        assert!((eval.outcome.confidence - 0.85).abs() < 1e-9);
        assert_eq!(eval.outcome.evidence["fields_matched"], "model");
    }

    #[test]
    fn tier2_full_field_coverage_scores_one() {
        let e = entry("Summit", "X with Expert Pkg");
        let candidate = vehicle("summit-x", "SUMMIT X WITH EXPERT PACKAGE", "SUMMIT");
        let config = MatchingConfig::default();

        let eval = tier2_normalized(&e, std::slice::from_ref(&candidate), &config);
        assert!(eval.outcome.hit);
        assert_eq!(eval.outcome.confidence, 1.0);
        assert_eq!(eval.outcome.evidence["fields_matched"], "model,package");
    }

    #[test]
    fn tier2_without_model_stays_low() {
        let e = entry("Expedition", "");
        let candidate = vehicle("summit-x", "SUMMIT X", "SUMMIT");
        let config = MatchingConfig::default();

        let eval = tier2_normalized(&e, std::slice::from_ref(&candidate), &config);
        assert!(!eval.outcome.hit);
        assert_eq!(eval.outcome.confidence, 0.0);
    }

    #[test]
    fn ties_prefer_extraction_quality_then_id() {
        let e = entry("Summit", "");
        let mut a = vehicle("summit-b", "SUMMIT X", "SUMMIT");
        let mut b = vehicle("summit-a", "SUMMIT SP", "SUMMIT");
        a.extraction_quality = 0.8;
        b.extraction_quality = 0.95;
        let config = MatchingConfig::default();

        let eval = tier1_exact(&e, &[a.clone(), b.clone()], &config);
        assert_eq!(eval.outcome.evidence["matched_id"], "summit-a");

        // Equal quality falls back to lexical id order.
        a.extraction_quality = 0.95;
        let eval = tier1_exact(&e, &[a, b], &config);
        assert_eq!(eval.outcome.evidence["matched_id"], "summit-a");
    }

    #[tokio::test]
    async fn tier3_down_weights_cross_family() {
        let e = entry("Summit", "");
        let same = vehicle("summit-x", "SUMMIT X", "SUMMIT");
        let cross = vehicle("mxz-x", "SUMMIT X", "MXZ");
        let config = MatchingConfig::default();
        let scorer = lineup_scorer::LexicalScorer;

        let eval_same = tier3_semantic(&e, std::slice::from_ref(&same), &config, &scorer).await;
        let eval_cross = tier3_semantic(&e, std::slice::from_ref(&cross), &config, &scorer).await;

        assert_eq!(eval_same.outcome.evidence["same_family"], "true");
        assert_eq!(eval_cross.outcome.evidence["same_family"], "false");
        assert!(eval_cross.outcome.confidence < eval_same.outcome.confidence);
    }

    struct FailingScorer;

    #[async_trait::async_trait]
    impl SimilarityScorer for FailingScorer {
        fn id(&self) -> &str {
            "embedding-http"
        }
        async fn score(&self, _a: &str, _b: &str) -> lineup_shared::Result<f64> {
            Err(LineupError::scorer_unavailable("connection refused"))
        }
    }

    #[tokio::test]
    async fn tier3_scorer_failure_degrades_gracefully() {
        let e = entry("Summit", "");
        let candidate = vehicle("summit-x", "SUMMIT X", "SUMMIT");
        let config = MatchingConfig::default();

        let eval =
            tier3_semantic(&e, std::slice::from_ref(&candidate), &config, &FailingScorer).await;
        assert!(!eval.outcome.hit);
        assert_eq!(eval.outcome.confidence, 0.0);
        assert_eq!(eval.outcome.evidence["status"], "unavailable");
        assert!(eval.best.is_none());
    }

    #[test]
    fn lexical_scorer_gets_the_lower_floor() {
        let config = MatchingConfig::default();
        assert_eq!(
            tier3_threshold(&config, &lineup_scorer::LexicalScorer),
            config.lexical_floor
        );
    }
}
