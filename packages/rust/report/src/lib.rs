//! Batch report artifacts.
//!
//! Pure string-building generators consumed by the CLI after a batch run:
//! a human-readable summary, a failure triage list ordered by ascending
//! confidence (worst first), and a machine-readable JSON report. No I/O
//! happens here; callers decide where the artifacts land.

use serde::Serialize;

use lineup_shared::{
    BatchStats, LineupError, MatchFailure, ProductSpecification, Result, RunId,
};

/// Generate the human-readable batch summary.
pub fn generate_summary(run_id: &RunId, stats: &BatchStats, elapsed_ms: u128) -> String {
    let mut out = String::new();
    out.push_str("# Reconciliation summary\n\n");
    out.push_str(&format!("Run: {run_id}\n"));
    out.push_str(&format!("Catalog vehicles:  {}\n", stats.catalog_vehicles));
    out.push_str(&format!("Price entries:     {}\n", stats.price_entries));
    out.push_str(&format!("Successful matches: {}\n", stats.successful_matches));
    out.push_str(&format!("Failed matches:     {}\n", stats.failed_matches));
    out.push_str(&format!(
        "Match success rate: {:.1}%\n",
        stats.match_success_rate() * 100.0
    ));
    out.push_str(&format!("Elapsed: {elapsed_ms} ms\n"));
    out
}

/// Generate the failure triage report: lowest confidence first, so operators
/// start with the worst cases.
pub fn generate_failure_report(failures: &[MatchFailure]) -> String {
    let mut out = String::new();
    out.push_str("# Unmatched price entries\n\n");

    if failures.is_empty() {
        out.push_str("All price entries matched.\n");
        return out;
    }

    let mut sorted: Vec<&MatchFailure> = failures.iter().collect();
    sorted.sort_by(|a, b| {
        a.best_confidence
            .partial_cmp(&b.best_confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.model_code.cmp(&b.model_code))
    });

    for failure in sorted {
        out.push_str(&format!(
            "- {} (best confidence {:.2}, via {})\n",
            failure.model_code, failure.best_confidence, failure.attempted_method
        ));
        for reason in &failure.reasons {
            out.push_str(&format!("    - {reason}\n"));
        }
    }
    out
}

/// The machine-readable report body.
#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    run_id: &'a RunId,
    generated_at: String,
    stats: &'a BatchStats,
    match_success_rate: f64,
    specifications: &'a [ProductSpecification],
    failures: &'a [MatchFailure],
}

/// Generate the machine-readable JSON report.
pub fn generate_json_report(
    run_id: &RunId,
    stats: &BatchStats,
    specifications: &[ProductSpecification],
    failures: &[MatchFailure],
) -> Result<String> {
    let report = JsonReport {
        run_id,
        generated_at: chrono::Utc::now().to_rfc3339(),
        stats,
        match_success_rate: stats.match_success_rate(),
        specifications,
        failures,
    };
    serde_json::to_string_pretty(&report)
        .map_err(|e| LineupError::validation(format!("report serialization failed: {e}")))
}
