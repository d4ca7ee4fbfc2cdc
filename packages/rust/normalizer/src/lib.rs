//! Canonicalization of model, package, and engine strings for comparison.
//!
//! The price list and the catalog describe the same configuration in
//! different languages and registers ("X with Expert Pkg" vs
//! "SUMMIT X WITH EXPERT PACKAGE"). Each normalizer is a sequence of
//! cleanup passes `&str -> String` applied in order, so that linguistically
//! equivalent strings converge to the same canonical form.
//!
//! All functions are pure, deterministic, and total: empty string in,
//! empty string out, never a panic. Applying a normalizer to its own
//! output is a no-op (idempotence), which the matcher relies on.

mod abbrev;

use std::sync::LazyLock;

use regex::Regex;

pub use abbrev::expand_token;

/// Normalize a model name (e.g. `Summit`, `MXZ X-RS`).
pub fn normalize_model_name(s: &str) -> String {
    run_passes(s)
}

/// Normalize a package description (e.g. `X with Expert Pkg`).
pub fn normalize_package_name(s: &str) -> String {
    run_passes(s)
}

/// Normalize an engine specification (e.g. `850 E-TEC`, `600cc EFI`).
///
/// On top of the shared passes, numeric displacement tokens drop a trailing
/// `CC` suffix so `800cc` and `800` compare equal.
pub fn normalize_engine_spec(s: &str) -> String {
    let canonical = run_passes(s);
    strip_displacement_suffix(&canonical)
}

/// Run the shared cleanup passes in order.
fn run_passes(s: &str) -> String {
    let mut result = s.to_uppercase();

    result = canonicalize_compounds(&result);
    result = punctuation_to_space(&result);
    result = expand_tokens(&result);
    collapse_whitespace(&result)
}

// ---------------------------------------------------------------------------
// Pass 1: Canonicalize compound tokens
// ---------------------------------------------------------------------------

/// Rewrite compound spellings whose hyphen/slash is part of the token, before
/// the punctuation pass would split them apart.
fn canonicalize_compounds(s: &str) -> String {
    static E_TEC_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\bE[-–]TEC\b").expect("valid regex"));
    static FOUR_TEC_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b4[-–]TEC\b").expect("valid regex"));
    static WITH_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\bW/").expect("valid regex"));

    let result = E_TEC_RE.replace_all(s, "ETEC");
    let result = FOUR_TEC_RE.replace_all(&result, "4TEC");
    WITH_RE.replace_all(&result, " WITH ").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 2: Punctuation to whitespace
// ---------------------------------------------------------------------------

/// Replace separator punctuation with spaces so `X-RS` and `X RS` compare
/// equal. Compound tokens were already canonicalized by the prior pass.
fn punctuation_to_space(s: &str) -> String {
    static PUNCT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[-–_/+.,]").expect("valid regex"));

    PUNCT_RE.replace_all(s, " ").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 3: Abbreviation expansion
// ---------------------------------------------------------------------------

/// Expand each whitespace-delimited token through the abbreviation table.
fn expand_tokens(s: &str) -> String {
    s.split_whitespace()
        .map(abbrev::expand_token)
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Pass 4: Whitespace collapse
// ---------------------------------------------------------------------------

/// Collapse internal whitespace runs and strip leading/trailing whitespace.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Engine-specific pass
// ---------------------------------------------------------------------------

/// Drop a trailing `CC` from numeric displacement tokens (`800CC` → `800`).
fn strip_displacement_suffix(s: &str) -> String {
    static CC_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(\d{3,4})CC\b").expect("valid regex"));

    CC_RE.replace_all(s, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_name_uppercase_and_trim() {
        assert_eq!(normalize_model_name("  Summit  "), "SUMMIT");
        assert_eq!(normalize_model_name("mxz"), "MXZ");
    }

    #[test]
    fn package_abbreviations_expand() {
        assert_eq!(
            normalize_package_name("X with Expert Pkg"),
            "X WITH EXPERT PACKAGE"
        );
        assert_eq!(normalize_package_name("Expert PCKG"), "EXPERT PACKAGE");
        assert_eq!(normalize_package_name("X w/ Expert Pkg"), "X WITH EXPERT PACKAGE");
    }

    #[test]
    fn source_language_package_converges() {
        // The price list's source language and the catalog's target language
        // must produce the same canonical token.
        assert_eq!(normalize_package_name("Expert-paketti"), "EXPERT PACKAGE");
    }

    #[test]
    fn hyphen_variants_converge() {
        assert_eq!(normalize_model_name("X-RS"), "X RS");
        assert_eq!(normalize_model_name("X RS"), "X RS");
        assert_eq!(normalize_model_name("Grand_Touring"), "GRAND TOURING");
    }

    #[test]
    fn engine_spec_canonical() {
        assert_eq!(normalize_engine_spec("850 E-TEC"), "850 ETEC");
        assert_eq!(normalize_engine_spec("850 ETEC"), "850 ETEC");
        assert_eq!(normalize_engine_spec("600cc EFI"), "600 EFI");
        assert_eq!(normalize_engine_spec("900 ACE Turbo"), "900 ACE TURBO");
    }

    #[test]
    fn empty_and_whitespace_are_total() {
        assert_eq!(normalize_model_name(""), "");
        assert_eq!(normalize_package_name("   "), "");
        assert_eq!(normalize_engine_spec("\t\n"), "");
    }

    #[test]
    fn whitespace_collapses() {
        assert_eq!(
            normalize_package_name("X   with\tExpert   Pkg"),
            "X WITH EXPERT PACKAGE"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "Summit",
            "X with Expert Pkg",
            "X-RS w/ Competition Pkg",
            "850 E-TEC",
            "600cc EFI",
            "Grand Touring LTD",
            "Expert-paketti",
            "",
            "   odd   spacing   ",
        ];
        for s in samples {
            let once = normalize_model_name(s);
            assert_eq!(normalize_model_name(&once), once, "model: {s:?}");

            let once = normalize_package_name(s);
            assert_eq!(normalize_package_name(&once), once, "package: {s:?}");

            let once = normalize_engine_spec(s);
            assert_eq!(normalize_engine_spec(&once), once, "engine: {s:?}");
        }
    }
}
