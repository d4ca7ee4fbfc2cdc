//! Core reconciliation pipeline for Lineup.
//!
//! Ties together the tiered matcher, the 5-stage specification inheritance
//! pipeline, and the batch driver that turns a price list and a catalog
//! into confidence-scored product specifications.

pub mod batch;
pub mod context;
pub mod pipeline;
pub mod stages;

#[cfg(test)]
pub(crate) mod test_support;

pub use batch::{BatchOutcome, ProgressReporter, SilentProgress, reconcile_batch};
pub use context::PipelineContext;
pub use pipeline::{PipelineRun, run_pipeline, run_pipeline_detailed};
