//! Error types for Lineup.
//!
//! Library crates use [`LineupError`] via `thiserror`.
//! App crates (cli) wrap this with `color-eyre` for rich diagnostics.
//!
//! Per-entry failures are data, not errors: a price entry that cannot be
//! matched still produces a flagged, low-confidence record. The variants
//! below exist for the places where something genuinely cannot proceed
//! (bad config, unreadable input, storage faults) or where a component
//! needs to signal a degraded mode (scorer unavailable).

use std::path::PathBuf;

/// Top-level error type for all Lineup operations.
#[derive(Debug, thiserror::Error)]
pub enum LineupError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Input loading error (price list / catalog JSON).
    #[error("input error: {0}")]
    Input(String),

    /// The candidate set handed to the matcher was empty.
    #[error("no catalog candidates available for matching")]
    NoCandidates,

    /// The tier-3 similarity scorer failed or timed out.
    /// Matching degrades to "tier 3 unavailable", never a batch abort.
    #[error("similarity scorer unavailable: {reason}")]
    ScorerUnavailable { reason: String },

    /// Stage 1 produced no base model for a price entry.
    #[error("no base model matched for price entry {model_code}")]
    MissingBaseModel { model_code: String },

    /// Final validation found contradictory merged fields.
    #[error("inconsistent specification: {message}")]
    InconsistentSpecification { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LineupError>;

impl LineupError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an input error from any displayable message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a scorer-unavailable error from any displayable reason.
    pub fn scorer_unavailable(reason: impl Into<String>) -> Self {
        Self::ScorerUnavailable {
            reason: reason.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
