//! Application configuration for Lineup.
//!
//! User config lives at `~/.lineup/lineup.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! Every confidence comparison in the matcher and pipeline goes through a
//! named threshold field here, so tuning is single-point and the ordering
//! invariant is enforceable in one place.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LineupError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lineup.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lineup";

// ---------------------------------------------------------------------------
// Config structs (matching lineup.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Matching thresholds.
    #[serde(default)]
    pub thresholds: ThresholdsConfig,

    /// Specification inheritance rule tables.
    #[serde(default)]
    pub inheritance: InheritanceRules,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default report output directory.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Default database path.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Tier-3 scorer backend: "lexical", "bridge", or "http".
    #[serde(default = "default_scorer")]
    pub scorer: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            db_path: default_db_path(),
            scorer: default_scorer(),
        }
    }
}

fn default_output_dir() -> String {
    "~/lineup-runs".into()
}
fn default_db_path() -> String {
    "~/lineup-runs/lineup.db".into()
}
fn default_scorer() -> String {
    "lexical".into()
}

/// `[thresholds]` section.
///
/// Ordering invariant: `exact ≥ normalized ≥ fuzzy` (and the lexical floor
/// below fuzzy). Violating configurations are rejected at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    /// Tier 1 must reach this confidence to decide the match.
    #[serde(default = "default_exact_match_threshold")]
    pub exact_match_threshold: f64,

    /// Tier 2 must reach this confidence to decide the match.
    #[serde(default = "default_normalized_match_threshold")]
    pub normalized_match_threshold: f64,

    /// Tier 3 must reach this similarity to decide the match.
    #[serde(default = "default_fuzzy_match_threshold")]
    pub fuzzy_match_threshold: f64,

    /// Tier 3 threshold when the pure-lexical fallback scorer is active.
    #[serde(default = "default_lexical_floor")]
    pub lexical_floor: f64,

    /// Matches below this overall confidence require human review.
    #[serde(default = "default_auto_accept_threshold")]
    pub auto_accept_threshold: f64,

    /// Multiplier applied to tier-3 similarity when the best candidate is
    /// from a different model family than the price entry.
    #[serde(default = "default_cross_family_penalty")]
    pub cross_family_penalty: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            exact_match_threshold: default_exact_match_threshold(),
            normalized_match_threshold: default_normalized_match_threshold(),
            fuzzy_match_threshold: default_fuzzy_match_threshold(),
            lexical_floor: default_lexical_floor(),
            auto_accept_threshold: default_auto_accept_threshold(),
            cross_family_penalty: default_cross_family_penalty(),
        }
    }
}

fn default_exact_match_threshold() -> f64 {
    0.95
}
fn default_normalized_match_threshold() -> f64 {
    0.85
}
fn default_fuzzy_match_threshold() -> f64 {
    0.7
}
fn default_lexical_floor() -> f64 {
    0.6
}
fn default_auto_accept_threshold() -> f64 {
    0.9
}
fn default_cross_family_penalty() -> f64 {
    0.8
}

// ---------------------------------------------------------------------------
// Inheritance rule tables
// ---------------------------------------------------------------------------

/// `[inheritance]` section: rule tables applied by the specification
/// inheritance stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InheritanceRules {
    /// Brand-specific field overrides (e.g. drivetrain naming).
    #[serde(default = "default_brand_rules")]
    pub brand_rules: Vec<BrandRule>,

    /// Features every model of a given year range carries.
    #[serde(default = "default_year_features")]
    pub year_features: Vec<YearFeatureRule>,

    /// Features gated by price bands.
    #[serde(default = "default_price_tiers")]
    pub price_tiers: Vec<PriceTierRule>,
}

impl Default for InheritanceRules {
    fn default() -> Self {
        Self {
            brand_rules: default_brand_rules(),
            year_features: default_year_features(),
            price_tiers: default_price_tiers(),
        }
    }
}

/// `[[inheritance.brand_rules]]` — set `field` to `value` for `brand`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandRule {
    pub brand: String,
    pub field: String,
    pub value: String,
}

/// `[[inheritance.year_features]]` — features standard from `min_year` on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearFeatureRule {
    pub min_year: u16,
    pub features: Vec<String>,
}

/// `[[inheritance.price_tiers]]` — features standard at or above `min_price`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTierRule {
    pub min_price: f64,
    pub features: Vec<String>,
}

fn default_brand_rules() -> Vec<BrandRule> {
    vec![
        BrandRule {
            brand: "LYNX".into(),
            field: "suspension.rear_suspension".into(),
            value: "PPS".into(),
        },
        BrandRule {
            brand: "SKI-DOO".into(),
            field: "suspension.rear_suspension".into(),
            value: "rMotion".into(),
        },
    ]
}

fn default_year_features() -> Vec<YearFeatureRule> {
    vec![YearFeatureRule {
        min_year: 2024,
        features: vec!["digital_display".into()],
    }]
}

fn default_price_tiers() -> Vec<PriceTierRule> {
    vec![
        PriceTierRule {
            min_price: 12_000.0,
            features: vec!["heated_grips".into()],
        },
        PriceTierRule {
            min_price: 16_000.0,
            features: vec!["heated_grips".into(), "electric_reverse".into()],
        },
    ]
}

// ---------------------------------------------------------------------------
// Matching config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime matching configuration — merged from config file + CLI flags.
/// Constructed once at batch start and passed by reference into every
/// matcher/pipeline call; no global mutable settings.
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Tier 1 threshold.
    pub exact_match_threshold: f64,
    /// Tier 2 threshold.
    pub normalized_match_threshold: f64,
    /// Tier 3 threshold.
    pub fuzzy_match_threshold: f64,
    /// Tier 3 threshold under the lexical fallback scorer.
    pub lexical_floor: f64,
    /// Auto-accept threshold for the review flag.
    pub auto_accept_threshold: f64,
    /// Cross-family similarity multiplier for tier 3.
    pub cross_family_penalty: f64,
    /// Model family to fall back to when no candidate matches, if any.
    pub fallback_family: Option<String>,
}

impl MatchingConfig {
    /// Check the ordering and range invariants. Any violating configuration
    /// is rejected before a batch starts.
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("exact_match_threshold", self.exact_match_threshold),
            ("normalized_match_threshold", self.normalized_match_threshold),
            ("fuzzy_match_threshold", self.fuzzy_match_threshold),
            ("lexical_floor", self.lexical_floor),
            ("auto_accept_threshold", self.auto_accept_threshold),
            ("cross_family_penalty", self.cross_family_penalty),
        ];
        for (name, value) in named {
            if !(0.0..=1.0).contains(&value) {
                return Err(LineupError::config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        if self.exact_match_threshold < self.normalized_match_threshold {
            return Err(LineupError::config(format!(
                "exact_match_threshold ({}) must be ≥ normalized_match_threshold ({})",
                self.exact_match_threshold, self.normalized_match_threshold
            )));
        }
        if self.normalized_match_threshold < self.fuzzy_match_threshold {
            return Err(LineupError::config(format!(
                "normalized_match_threshold ({}) must be ≥ fuzzy_match_threshold ({})",
                self.normalized_match_threshold, self.fuzzy_match_threshold
            )));
        }
        if self.fuzzy_match_threshold < self.lexical_floor {
            return Err(LineupError::config(format!(
                "fuzzy_match_threshold ({}) must be ≥ lexical_floor ({})",
                self.fuzzy_match_threshold, self.lexical_floor
            )));
        }
        Ok(())
    }
}

impl From<&AppConfig> for MatchingConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            exact_match_threshold: config.thresholds.exact_match_threshold,
            normalized_match_threshold: config.thresholds.normalized_match_threshold,
            fuzzy_match_threshold: config.thresholds.fuzzy_match_threshold,
            lexical_floor: config.thresholds.lexical_floor,
            auto_accept_threshold: config.thresholds.auto_accept_threshold,
            cross_family_penalty: config.thresholds.cross_family_penalty,
            fallback_family: None,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lineup/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LineupError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lineup/lineup.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LineupError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LineupError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LineupError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LineupError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LineupError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
