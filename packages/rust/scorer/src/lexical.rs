//! Pure-lexical similarity fallback.
//!
//! Blends normalized Levenshtein distance with token-set overlap so that
//! both near-miss spellings ("EXPIDITION") and reordered descriptions
//! ("EXPERT PACKAGE SUMMIT") score usefully. Always available; the matcher
//! applies the lexical threshold floor when this backend is active.

use std::collections::BTreeSet;

use lineup_shared::Result;

use crate::{LEXICAL_SCORER_ID, SimilarityScorer, clamp_similarity};

/// Edit-distance + token-overlap similarity scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

#[async_trait::async_trait]
impl SimilarityScorer for LexicalScorer {
    fn id(&self) -> &str {
        LEXICAL_SCORER_ID
    }

    async fn score(&self, text_a: &str, text_b: &str) -> Result<f64> {
        Ok(similarity(text_a, text_b))
    }
}

/// Combined similarity in `[0, 1]`: the stronger of the two signals wins.
/// Edit distance catches near-miss spellings, token overlap catches
/// reordered descriptions.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let char_sim = char_similarity(a, b);
    let token_sim = token_similarity(a, b);
    clamp_similarity(char_sim.max(token_sim))
}

/// 1 − levenshtein(a, b) / max(len). Char-level, unicode-aware.
fn char_similarity(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(&a_chars, &b_chars);
    1.0 - distance as f64 / max_len as f64
}

/// Jaccard overlap of whitespace-delimited token sets.
fn token_similarity(a: &str, b: &str) -> f64 {
    let a_tokens: BTreeSet<&str> = a.split_whitespace().collect();
    let b_tokens: BTreeSet<&str> = b.split_whitespace().collect();
    if a_tokens.is_empty() && b_tokens.is_empty() {
        return 1.0;
    }
    let intersection = a_tokens.intersection(&b_tokens).count();
    let union = a_tokens.union(&b_tokens).count();
    intersection as f64 / union as f64
}

/// Classic two-row Levenshtein distance.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
