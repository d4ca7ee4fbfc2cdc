//! The five sequential pipeline stages.
//!
//! Stages 2–4 share the uniform signature
//! `fn(&mut PipelineContext, &MatchingConfig, &InheritanceRules) -> StageResult`
//! so the driver can run them as a fixed ordered list. Stage 1 is async
//! (the tier-3 scorer may suspend) and stage 5 additionally returns the
//! frozen terminal record.

pub mod customization;
pub mod inheritance;
pub mod matching;
pub mod spring_options;
pub mod validation;

use lineup_shared::{InheritanceRules, MatchingConfig, StageResult};

use crate::context::PipelineContext;

/// Uniform signature for the synchronous middle stages.
pub type StageFn = fn(&mut PipelineContext, &MatchingConfig, &InheritanceRules) -> StageResult;

/// Stages 2–4 in execution order.
pub const MIDDLE_STAGES: [StageFn; 3] = [
    inheritance::run,
    customization::run,
    spring_options::run,
];
