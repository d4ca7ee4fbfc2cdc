//! Shared types, error model, and configuration for Lineup.
//!
//! This crate is the foundation depended on by all other Lineup crates.
//! It provides:
//! - [`LineupError`] — the unified error type
//! - Domain types ([`PriceEntry`], [`CatalogVehicle`], [`MatchingResult`],
//!   [`ProductSpecification`], [`RunId`])
//! - Configuration ([`AppConfig`], [`MatchingConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrandRule, DefaultsConfig, InheritanceRules, MatchingConfig, PriceTierRule,
    ThresholdsConfig, YearFeatureRule, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{LineupError, Result};
pub use types::{
    BatchStats, CURRENT_SCHEMA_VERSION, CatalogVehicle, ConfidenceLevel, MatchFailure,
    MatchMethod, MatchingResult, NormalizedFields, PriceEntry, ProcessingStage,
    ProductSpecification, RunId, SpecificationGroups, SpringOption, SpringOptionType,
    StageResult, TierOutcome,
};
