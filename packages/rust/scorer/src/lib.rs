//! Pluggable similarity scoring for tier-3 matching.
//!
//! The matcher never assumes what backs a scorer: it may be lexical
//! edit-distance, an embedding service, or an LLM call. All backends
//! implement [`SimilarityScorer`] and return a similarity in `[0, 1]`.
//! A failing or timed-out backend surfaces as
//! [`LineupError::ScorerUnavailable`], which the matcher treats as
//! "tier 3 not available" rather than a batch-level failure.

mod bridge;
mod http;
mod lexical;

use sha2::{Digest, Sha256};

use lineup_shared::Result;

pub use bridge::{BridgeScorer, BridgeScorerConfig};
pub use http::{HttpScorer, HttpScorerConfig};
pub use lexical::LexicalScorer;

/// Scorer id of the built-in lexical fallback. The matcher applies the
/// lower lexical threshold floor when this scorer is active.
pub const LEXICAL_SCORER_ID: &str = "lexical";

// ---------------------------------------------------------------------------
// SimilarityScorer trait
// ---------------------------------------------------------------------------

/// A pluggable similarity scorer: `score(a, b) -> [0, 1]`.
#[async_trait::async_trait]
pub trait SimilarityScorer: Send + Sync {
    /// Stable backend identifier, used for threshold selection and cache keys.
    fn id(&self) -> &str;

    /// Score the similarity of two texts. Implementations must return a
    /// value in `[0, 1]` or [`LineupError::ScorerUnavailable`].
    async fn score(&self, text_a: &str, text_b: &str) -> Result<f64>;
}

/// Clamp a backend-reported similarity into `[0, 1]`.
///
/// NaN maps to 0.0 so a misbehaving backend can never poison a confidence.
pub(crate) fn clamp_similarity(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

// ---------------------------------------------------------------------------
// Cache keying
// ---------------------------------------------------------------------------

/// Compute the cache key for a scored text pair.
///
/// The scorer id participates so switching backends never reuses stale
/// similarities.
pub fn pair_hash(scorer_id: &str, text_a: &str, text_b: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scorer_id.as_bytes());
    hasher.update([0]);
    hasher.update(text_a.as_bytes());
    hasher.update([0]);
    hasher.update(text_b.as_bytes());
    format!("{:x}", hasher.finalize())
}
