//! Abbreviation table shared by the normalizer passes.
//!
//! Maps abbreviated or source-language tokens to the canonical target-language
//! token. Every value must be a fixed point of the table (expanding an
//! expansion is a no-op), which keeps the normalizers idempotent.

/// Expand a single uppercase token through the abbreviation table.
/// Unknown tokens pass through unchanged.
pub fn expand_token(token: &str) -> &str {
    match token {
        // Packaging
        "PKG" | "PCKG" => "PACKAGE",
        "PAKETTI" => "PACKAGE",
        // Editions and trims
        "LTD" => "LIMITED",
        "STD" => "STANDARD",
        // Components
        "ELEC" => "ELECTRIC",
        "SUSP" => "SUSPENSION",
        // Connectives
        "&" => "AND",
        _ => token,
    }
}
