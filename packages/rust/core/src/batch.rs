//! Batch reconciliation driver.
//!
//! Each price entry's match-then-inherit run is independent and owns its
//! own context; the catalog vehicle collection is shared read-only for the
//! whole batch. Entries are processed one at a time (tier-3 scoring is the
//! only suspending operation) and the aggregate statistics are folded from
//! per-entry outcomes rather than accumulated in shared mutable counters.
//!
//! Results are correlated by `model_code`, never by position.

use std::time::Instant;

use tracing::{info, instrument, warn};

use lineup_scorer::SimilarityScorer;
use lineup_shared::{
    BatchStats, CatalogVehicle, InheritanceRules, MatchFailure, MatchingConfig, MatchingResult,
    PriceEntry, ProductSpecification, Result, RunId,
};

use crate::pipeline;

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting batch status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each entry's pipeline run finishes.
    fn entry_processed(&self, model_code: &str, current: usize, total: usize);
    /// Called when the batch completes.
    fn done(&self, stats: &BatchStats);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn entry_processed(&self, _model_code: &str, _current: usize, _total: usize) {}
    fn done(&self, _stats: &BatchStats) {}
}

// ---------------------------------------------------------------------------
// Batch outcome
// ---------------------------------------------------------------------------

/// Everything one reconciliation batch produced.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Identifier for this batch run.
    pub run_id: RunId,
    /// One terminal record per processed entry (matched or flagged).
    pub specifications: Vec<ProductSpecification>,
    /// Diagnostics for entries that found no base model, for triage.
    pub failures: Vec<MatchFailure>,
    /// Aggregate counters.
    pub stats: BatchStats,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Reconcile a batch of price entries against a catalog vehicle collection.
///
/// Per-entry failures never abort the batch: every entry lands either as a
/// full specification or as a flagged LOW record plus a failure entry with
/// its best attempted confidence and reasons.
#[instrument(skip_all, fields(entries = entries.len(), vehicles = vehicles.len()))]
pub async fn reconcile_batch(
    entries: &[PriceEntry],
    vehicles: &[CatalogVehicle],
    config: &MatchingConfig,
    rules: &InheritanceRules,
    scorer: &dyn SimilarityScorer,
    progress: &dyn ProgressReporter,
) -> Result<BatchOutcome> {
    config.validate()?;

    let start = Instant::now();
    let run_id = RunId::new();

    info!(%run_id, "starting reconciliation batch");
    progress.phase("Matching price entries to catalog vehicles");

    let total = entries.len();
    let mut runs: Vec<pipeline::PipelineRun> = Vec::with_capacity(total);

    for (i, entry) in entries.iter().enumerate() {
        let run = pipeline::run_pipeline_detailed(
            entry.clone(),
            vehicles,
            config,
            rules,
            scorer,
        )
        .await;

        if run.specification.base_model_id.is_none() {
            warn!(
                model_code = %run.specification.model_code,
                confidence = run.matching.overall_confidence,
                "entry failed to match"
            );
        }

        progress.entry_processed(&run.specification.model_code, i + 1, total);
        runs.push(run);
    }

    let failures: Vec<MatchFailure> = runs
        .iter()
        .filter(|run| run.specification.base_model_id.is_none())
        .map(|run| failure_from(&run.matching))
        .collect();

    // Fold, not shared mutable counters: the reduction stays correct under
    // any future parallel split of the loop above.
    let stats = runs.iter().fold(
        BatchStats {
            catalog_vehicles: vehicles.len(),
            ..BatchStats::default()
        },
        |mut acc, run| {
            acc.price_entries += 1;
            if run.specification.base_model_id.is_some() {
                acc.successful_matches += 1;
            } else {
                acc.failed_matches += 1;
            }
            acc
        },
    );

    let specifications = runs.into_iter().map(|run| run.specification).collect();

    let outcome = BatchOutcome {
        run_id,
        specifications,
        failures,
        stats,
        elapsed: start.elapsed(),
    };

    progress.done(&outcome.stats);

    info!(
        run_id = %outcome.run_id,
        entries = outcome.stats.price_entries,
        matched = outcome.stats.successful_matches,
        failed = outcome.stats.failed_matches,
        success_rate = outcome.stats.match_success_rate(),
        elapsed_ms = outcome.elapsed.as_millis(),
        "reconciliation batch complete"
    );

    Ok(outcome)
}

/// Turn matching diagnostics into a triage record.
fn failure_from(matching: &MatchingResult) -> MatchFailure {
    let mut reasons = vec!["no tier cleared its matching threshold".to_string()];
    reasons.extend(matching.quality_issues.iter().cloned());

    MatchFailure {
        model_code: matching.model_code.clone(),
        best_confidence: matching.overall_confidence,
        attempted_method: matching.final_matching_method,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entry, vehicle, vehicle_with_specs};
    use lineup_scorer::LexicalScorer;
    use lineup_shared::{ConfidenceLevel, LineupError};

    #[tokio::test]
    async fn batch_splits_matches_and_failures() {
        let entries = vec![
            entry("Summit", "X with Expert Pkg", "TLTA"),
            entry("Expedition", "SE", "EXPA"),
        ];
        let vehicles = vec![vehicle_with_specs("summit-x")];

        let outcome = reconcile_batch(
            &entries,
            &vehicles,
            &MatchingConfig::default(),
            &InheritanceRules::default(),
            &LexicalScorer,
            &SilentProgress,
        )
        .await
        .expect("batch");

        assert_eq!(outcome.stats.price_entries, 2);
        assert_eq!(outcome.stats.catalog_vehicles, 1);
        assert_eq!(outcome.stats.successful_matches, 1);
        assert_eq!(outcome.stats.failed_matches, 1);
        assert!((outcome.stats.match_success_rate() - 0.5).abs() < 1e-9);

        // Both entries produced a terminal record.
        assert_eq!(outcome.specifications.len(), 2);

        // The failed entry is also in the triage bucket, with confidence
        // and reasons rather than a bare boolean.
        assert_eq!(outcome.failures.len(), 1);
        let failure = &outcome.failures[0];
        assert_eq!(failure.model_code, "EXPA");
        assert!((0.0..=1.0).contains(&failure.best_confidence));
        assert!(!failure.reasons.is_empty());
    }

    #[tokio::test]
    async fn problem_entries_never_abort_the_batch() {
        let mut broken = entry("", "", "XXXX");
        broken.price = -1.0;
        let entries = vec![broken, entry("Summit", "", "TLTA")];
        let vehicles = vec![vehicle("summit-x", "SUMMIT X", "SUMMIT")];

        let outcome = reconcile_batch(
            &entries,
            &vehicles,
            &MatchingConfig::default(),
            &InheritanceRules::default(),
            &LexicalScorer,
            &SilentProgress,
        )
        .await
        .expect("batch");

        assert_eq!(outcome.specifications.len(), 2);
        let flagged = outcome
            .specifications
            .iter()
            .find(|s| s.model_code == "XXXX")
            .expect("flagged record present");
        assert_eq!(flagged.confidence_level, ConfidenceLevel::Low);
        assert!(flagged.requires_human_review);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_up_front() {
        let config = MatchingConfig {
            exact_match_threshold: 0.5, // below normalized: invalid ordering
            ..MatchingConfig::default()
        };
        let err = reconcile_batch(
            &[entry("Summit", "", "TLTA")],
            &[vehicle("summit-x", "SUMMIT X", "SUMMIT")],
            &config,
            &InheritanceRules::default(),
            &LexicalScorer,
            &SilentProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LineupError::Config { .. }));
    }

    #[tokio::test]
    async fn empty_catalog_flags_every_entry() {
        let entries = vec![entry("Summit", "", "TLTA")];
        let outcome = reconcile_batch(
            &entries,
            &[],
            &MatchingConfig::default(),
            &InheritanceRules::default(),
            &LexicalScorer,
            &SilentProgress,
        )
        .await
        .expect("batch");

        assert_eq!(outcome.stats.failed_matches, 1);
        assert!(
            outcome.failures[0]
                .reasons
                .iter()
                .any(|r| r.contains("empty candidate set"))
        );
    }
}
