//! The unit of work state threaded through the inheritance pipeline.

use std::collections::BTreeMap;

use uuid::Uuid;

use lineup_shared::{
    CatalogVehicle, MatchingResult, PriceEntry, ProcessingStage, SpringOption, StageResult,
};

/// Working state for one pipeline run.
///
/// Owned exclusively by a single run and mutated in place by each stage;
/// the terminal stage freezes it into a `ProductSpecification` and the
/// context is discarded. Never shared across concurrent runs.
#[derive(Debug)]
pub struct PipelineContext {
    /// The price entry being processed.
    pub price_entry: PriceEntry,
    /// Base model chosen by stage 1, if any.
    pub matched_base_model: Option<CatalogVehicle>,
    /// Full matching diagnostics from stage 1.
    pub matching: Option<MatchingResult>,
    /// Specification fields copied from the base model (dotted group keys,
    /// e.g. `engine.displacement`).
    pub inherited_specs: BTreeMap<String, String>,
    /// Entry-specific values detected from the model code. Overrides carry
    /// `<field>_customized` and `<field>_original` markers alongside the
    /// new value.
    pub customizations: BTreeMap<String, String>,
    /// Spring options accumulated by stage 4.
    pub spring_options: Vec<SpringOption>,
    /// Confidence after the most recent stage, always within [0, 1].
    pub current_confidence: f64,
    /// Unique id for this pipeline execution.
    pub processing_id: Uuid,
    /// Stages completed so far, in order.
    pub completed_stages: Vec<ProcessingStage>,
    /// Notes accumulated across stages for the terminal record.
    pub validation_notes: Vec<String>,
}

impl PipelineContext {
    /// Start a fresh context for one price entry.
    pub fn new(price_entry: PriceEntry) -> Self {
        Self {
            price_entry,
            matched_base_model: None,
            matching: None,
            inherited_specs: BTreeMap::new(),
            customizations: BTreeMap::new(),
            spring_options: Vec::new(),
            current_confidence: 0.0,
            processing_id: Uuid::now_v7(),
            completed_stages: Vec::new(),
            validation_notes: Vec::new(),
        }
    }

    /// Store a stage's outcome: confidence (clamped), completion, and notes.
    pub fn record_stage(&mut self, result: &StageResult) {
        self.current_confidence = result.confidence.clamp(0.0, 1.0);
        self.completed_stages.push(result.stage);
        self.validation_notes.extend(result.notes.iter().cloned());
    }

    /// Review flag carried from matching; true when matching never ran.
    pub fn requires_human_review(&self) -> bool {
        self.matching
            .as_ref()
            .map(|m| m.requires_human_review)
            .unwrap_or(true)
    }
}
