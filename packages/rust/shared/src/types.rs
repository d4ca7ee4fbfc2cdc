//! Core domain types for Lineup reconciliation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for persisted run artifacts.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for reconciliation run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// PriceEntry
// ---------------------------------------------------------------------------

/// Normalized variants of a price entry's descriptive fields, filled in by
/// the normalizer before matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFields {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub engine: String,
}

/// One sellable configuration row from the price list, keyed by a short
/// 4-character code. Produced by the extraction collaborator; immutable
/// once handed to the matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEntry {
    /// Short (4-char) configuration code, e.g. `TLTA`.
    pub model_code: String,
    /// Raw model name in the price list's source language.
    pub model: String,
    /// Raw package description, if the row carries one.
    #[serde(default)]
    pub package: String,
    /// Raw engine description.
    #[serde(default)]
    pub engine: String,
    /// Raw track description.
    #[serde(default)]
    pub track: String,
    /// Raw starter description.
    #[serde(default)]
    pub starter: String,
    /// Raw gauge/display description.
    #[serde(default)]
    pub display: String,
    /// Raw spring-option column, when the row names one.
    #[serde(default)]
    pub spring_option: String,
    /// Raw color description.
    #[serde(default)]
    pub color: String,
    /// Normalized variants of model/package/engine.
    #[serde(default)]
    pub normalized: NormalizedFields,
    /// List price.
    pub price: f64,
    /// ISO currency code.
    pub currency: String,
    /// Model year the row belongs to.
    pub model_year: u16,
    /// Brand the row belongs to.
    pub brand: String,
    /// Source file the row was extracted from.
    #[serde(default)]
    pub source_file: String,
    /// Page number within the source file.
    #[serde(default)]
    pub source_page: u32,
    /// Extraction layer's confidence in this row (0–1).
    #[serde(default = "default_extraction_score")]
    pub extraction_confidence: f64,
}

fn default_extraction_score() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// CatalogVehicle
// ---------------------------------------------------------------------------

/// Nested specification groups carried by a catalog vehicle page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecificationGroups {
    /// Engine specs keyed by field name (e.g. `displacement`, `fuel_system`).
    #[serde(default)]
    pub engine: BTreeMap<String, String>,
    /// Physical dimensions keyed by field name.
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    /// Suspension specs keyed by field name.
    #[serde(default)]
    pub suspension: BTreeMap<String, String>,
    /// Named feature list.
    #[serde(default)]
    pub features: Vec<String>,
    /// Available colors.
    #[serde(default)]
    pub colors: Vec<String>,
    /// Factory spring-option descriptions.
    #[serde(default)]
    pub spring_options: Vec<String>,
}

impl SpecificationGroups {
    /// True when no group carries any data.
    pub fn is_empty(&self) -> bool {
        self.engine.is_empty()
            && self.dimensions.is_empty()
            && self.suspension.is_empty()
            && self.features.is_empty()
            && self.colors.is_empty()
            && self.spring_options.is_empty()
    }
}

/// One named model-with-package description from the catalog, holding full
/// specifications. Many price entries may reference the same base model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogVehicle {
    /// Stable identifier within the catalog.
    pub id: String,
    /// Full display name as printed on the model page.
    pub display_name: String,
    /// Model family banner (e.g. `SUMMIT`), empty when the page omits it.
    #[serde(default)]
    pub model_family: String,
    /// Package name within the family, when stated separately.
    #[serde(default)]
    pub package_name: String,
    /// Nested specification groups.
    #[serde(default)]
    pub specifications: SpecificationGroups,
    /// Source catalog the page came from.
    #[serde(default)]
    pub source_catalog: String,
    /// Page number within the source catalog.
    #[serde(default)]
    pub source_page: u32,
    /// Extraction layer's quality score for this page (0–1).
    #[serde(default = "default_extraction_score")]
    pub extraction_quality: f64,
}

// ---------------------------------------------------------------------------
// Matching result
// ---------------------------------------------------------------------------

/// Which comparison strategy produced the final match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Tier 1: raw (case-folded only) substring containment.
    Exact,
    /// Tier 2: containment after full normalization.
    Normalized,
    /// Tier 3: pluggable similarity scorer.
    Semantic,
    /// No tier cleared its threshold.
    None,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Normalized => "normalized",
            Self::Semantic => "semantic",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one comparison tier, kept for diagnostics even when a prior
/// tier already decided the match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierOutcome {
    /// Whether the tier was evaluated at all.
    pub attempted: bool,
    /// Whether the tier cleared its threshold.
    pub hit: bool,
    /// Best confidence the tier reached across candidates (0–1).
    pub confidence: f64,
    /// Tier-specific evidence (algorithms applied, transformations, the
    /// candidate that produced the best score, family consistency, ...).
    pub evidence: BTreeMap<String, String>,
}

/// Result of evaluating one price entry against a candidate set.
/// Created once per evaluation; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingResult {
    /// Price entry code the evaluation was run for.
    pub model_code: String,
    /// Tier 1 (exact) outcome.
    pub tier1: TierOutcome,
    /// Tier 2 (normalized) outcome.
    pub tier2: TierOutcome,
    /// Tier 3 (fuzzy/semantic) outcome.
    pub tier3: TierOutcome,
    /// Which tier produced the winner.
    pub final_matching_method: MatchMethod,
    /// Confidence of the winning tier (0–1); escalation means only the
    /// winning tier's score is authoritative.
    pub overall_confidence: f64,
    /// Whether a human must review this match before publishing.
    pub requires_human_review: bool,
    /// Detected data-quality issues (empty candidate set, missing family,
    /// scorer degraded, ...).
    #[serde(default)]
    pub quality_issues: Vec<String>,
}

// ---------------------------------------------------------------------------
// Spring options
// ---------------------------------------------------------------------------

/// Category of a seasonally-limited or configuration-specific enhancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpringOptionType {
    TrackUpgrade,
    SuspensionUpgrade,
    ComfortUpgrade,
    PerformanceUpgrade,
    WeatherProtection,
    StorageUpgrade,
    ColorChange,
}

impl SpringOptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrackUpgrade => "track_upgrade",
            Self::SuspensionUpgrade => "suspension_upgrade",
            Self::ComfortUpgrade => "comfort_upgrade",
            Self::PerformanceUpgrade => "performance_upgrade",
            Self::WeatherProtection => "weather_protection",
            Self::StorageUpgrade => "storage_upgrade",
            Self::ColorChange => "color_change",
        }
    }
}

impl std::fmt::Display for SpringOptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected spring option with its supporting confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpringOption {
    pub option_type: SpringOptionType,
    /// Human-readable description of what was detected and why.
    pub description: String,
    /// Detection confidence (0–1).
    pub confidence: f64,
    /// Price impact when the source states one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_impact: Option<f64>,
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

/// The five sequential stages of the inheritance pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    BaseModelMatching,
    SpecificationInheritance,
    CustomizationProcessing,
    SpringOptionsEnhancement,
    FinalValidation,
}

impl ProcessingStage {
    /// All stages in execution order.
    pub const ALL: [ProcessingStage; 5] = [
        Self::BaseModelMatching,
        Self::SpecificationInheritance,
        Self::CustomizationProcessing,
        Self::SpringOptionsEnhancement,
        Self::FinalValidation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BaseModelMatching => "base_model_matching",
            Self::SpecificationInheritance => "specification_inheritance",
            Self::CustomizationProcessing => "customization_processing",
            Self::SpringOptionsEnhancement => "spring_options_enhancement",
            Self::FinalValidation => "final_validation",
        }
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage reports back to the pipeline driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Which stage ran.
    pub stage: ProcessingStage,
    /// Whether the stage completed its work (a stage can succeed with an
    /// empty payload, e.g. zero detected customizations).
    pub success: bool,
    /// Updated confidence the pipeline stores into the context (0–1).
    pub confidence: f64,
    /// Stage-specific notes carried into the terminal record.
    #[serde(default)]
    pub notes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Confidence level
// ---------------------------------------------------------------------------

/// Terminal classification of how trustworthy the merged specification is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// Lower bound for a HIGH classification.
    pub const HIGH_FLOOR: f64 = 0.9;
    /// Lower bound for a MEDIUM classification.
    pub const MEDIUM_FLOOR: f64 = 0.7;

    /// Classify a confidence score.
    pub fn from_score(score: f64) -> Self {
        if score >= Self::HIGH_FLOOR {
            Self::High
        } else if score >= Self::MEDIUM_FLOOR {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProductSpecification
// ---------------------------------------------------------------------------

/// The system's output of record: a fully merged, confidence-scored product
/// specification. Immutable once the final validation stage freezes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSpecification {
    /// Price entry code this record was built from.
    pub model_code: String,
    /// Pipeline run that produced this record.
    pub processing_id: Uuid,
    /// Brand.
    pub brand: String,
    /// Model year.
    pub model_year: u16,
    /// List price.
    pub price: f64,
    /// ISO currency code.
    pub currency: String,
    /// Identifier of the matched catalog base model, when one was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_model_id: Option<String>,
    /// Display name of the matched base model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_model_name: Option<String>,
    /// Merged specification tree (inherited values with customization
    /// overrides applied, plus `<field>_customized` / `<field>_original`
    /// markers for every override).
    pub specifications: BTreeMap<String, String>,
    /// Entry-specific values detected from the model code.
    pub customizations: BTreeMap<String, String>,
    /// Detected spring options.
    pub spring_options: Vec<SpringOption>,
    /// Final calibrated confidence (0–1).
    pub confidence_score: f64,
    /// HIGH/MEDIUM/LOW classification of `confidence_score`.
    pub confidence_level: ConfidenceLevel,
    /// Stages that completed for this record, in order.
    pub completed_stages: Vec<ProcessingStage>,
    /// Validation notes collected across stages.
    pub validation_notes: Vec<String>,
    /// Review flag carried over from matching; never silently dropped.
    pub requires_human_review: bool,
}

// ---------------------------------------------------------------------------
// Batch outcome types
// ---------------------------------------------------------------------------

/// Diagnostics for a price entry that found no acceptable catalog match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFailure {
    /// Price entry code, the correlation key for callers.
    pub model_code: String,
    /// Best confidence any tier reached (0–1).
    pub best_confidence: f64,
    /// Method of the best attempt.
    pub attempted_method: MatchMethod,
    /// Reasons the entry failed, for operator triage.
    pub reasons: Vec<String>,
}

/// Aggregate counters for one reconciliation batch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BatchStats {
    /// Catalog vehicles available as candidates.
    pub catalog_vehicles: usize,
    /// Price entries processed.
    pub price_entries: usize,
    /// Entries matched to a base model.
    pub successful_matches: usize,
    /// Entries with no acceptable match.
    pub failed_matches: usize,
}

impl BatchStats {
    /// Fraction of processed entries that matched (0 when nothing ran).
    pub fn match_success_rate(&self) -> f64 {
        if self.price_entries == 0 {
            0.0
        } else {
            self.successful_matches as f64 / self.price_entries as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn confidence_level_boundaries() {
        assert_eq!(ConfidenceLevel::from_score(0.95), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.9), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.89), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.7), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.69), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.0), ConfidenceLevel::Low);
    }

    #[test]
    fn match_success_rate() {
        let stats = BatchStats {
            catalog_vehicles: 10,
            price_entries: 8,
            successful_matches: 6,
            failed_matches: 2,
        };
        assert!((stats.match_success_rate() - 0.75).abs() < f64::EPSILON);

        let empty = BatchStats::default();
        assert_eq!(empty.match_success_rate(), 0.0);
    }

    #[test]
    fn stage_order_is_stable() {
        let names: Vec<&str> = ProcessingStage::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "base_model_matching",
                "specification_inheritance",
                "customization_processing",
                "spring_options_enhancement",
                "final_validation",
            ]
        );
    }

    #[test]
    fn price_entry_fixture_validates() {
        let fixture =
            std::fs::read_to_string("../../../fixtures/json/price_entries.fixture.json")
                .expect("read fixture");
        let parsed: Vec<PriceEntry> =
            serde_json::from_str(&fixture).expect("deserialize fixture price entries");
        assert!(!parsed.is_empty());
        assert!(parsed.iter().all(|e| e.model_code.len() == 4));
        assert!(
            parsed
                .iter()
                .all(|e| (0.0..=1.0).contains(&e.extraction_confidence))
        );
    }

    #[test]
    fn catalog_vehicle_fixture_validates() {
        let fixture =
            std::fs::read_to_string("../../../fixtures/json/catalog_vehicles.fixture.json")
                .expect("read fixture");
        let parsed: Vec<CatalogVehicle> =
            serde_json::from_str(&fixture).expect("deserialize fixture vehicles");
        assert!(!parsed.is_empty());
        assert!(parsed.iter().any(|v| !v.specifications.is_empty()));
    }

    #[test]
    fn matching_result_serialization() {
        let result = MatchingResult {
            model_code: "TLTA".into(),
            tier1: TierOutcome {
                attempted: true,
                hit: true,
                confidence: 1.0,
                evidence: BTreeMap::from([("matched_id".into(), "summit-x".into())]),
            },
            tier2: TierOutcome::default(),
            tier3: TierOutcome::default(),
            final_matching_method: MatchMethod::Exact,
            overall_confidence: 1.0,
            requires_human_review: false,
            quality_issues: vec![],
        };
        let json = serde_json::to_string(&result).expect("serialize");
        assert!(json.contains(r#""final_matching_method":"exact"#));
        let parsed: MatchingResult = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.final_matching_method, MatchMethod::Exact);
        assert_eq!(parsed.tier1.evidence["matched_id"], "summit-x");
    }
}
