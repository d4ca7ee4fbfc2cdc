//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use lineup_core::{BatchOutcome, ProgressReporter, reconcile_batch};
use lineup_scorer::{
    BridgeScorer, BridgeScorerConfig, HttpScorer, HttpScorerConfig, LexicalScorer,
    SimilarityScorer,
};
use lineup_shared::{
    AppConfig, BatchStats, CatalogVehicle, MatchingConfig, PriceEntry, config_file_path,
    init_config, load_config,
};
use lineup_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Lineup — reconcile a price list with a model catalog.
#[derive(Parser)]
#[command(
    name = "lineup",
    version,
    about = "Match price-list rows to catalog vehicles and emit confidence-scored product specifications.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Reconcile a price list against a catalog and persist the results.
    Reconcile {
        /// Path to the extracted price entries (JSON array).
        #[arg(long)]
        prices: PathBuf,

        /// Path to the extracted catalog vehicles (JSON array).
        #[arg(long)]
        catalog: PathBuf,

        /// Output directory for report artifacts (defaults to config).
        #[arg(short, long)]
        out: Option<String>,

        /// Database path (defaults to config).
        #[arg(long)]
        db: Option<String>,

        /// Tier-3 scorer backend: lexical, bridge, or http.
        #[arg(long)]
        scorer: Option<String>,

        /// Endpoint for the http scorer.
        #[arg(long)]
        scorer_endpoint: Option<String>,

        /// Command for the bridge scorer (e.g., "python3").
        #[arg(long)]
        bridge_cmd: Option<String>,

        /// Script path for the bridge scorer.
        #[arg(long)]
        bridge_script: Option<String>,

        /// Model family to fall back to when no candidate matches.
        #[arg(long)]
        fallback_family: Option<String>,
    },

    /// Regenerate report artifacts for a stored run.
    Report {
        /// Run id.
        #[arg(long)]
        run: String,

        /// Database path (defaults to config).
        #[arg(long)]
        db: Option<String>,

        /// Output directory for report artifacts (defaults to config).
        #[arg(short, long)]
        out: Option<String>,
    },

    /// List stored reconciliation runs.
    List {
        /// Database path (defaults to config).
        #[arg(long)]
        db: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Create a default config file.
    Init,
    /// Print the effective configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber from CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::EnvFilter;

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    match cli.log_format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command routing
// ---------------------------------------------------------------------------

/// Run the parsed CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Reconcile {
            prices,
            catalog,
            out,
            db,
            scorer,
            scorer_endpoint,
            bridge_cmd,
            bridge_script,
            fallback_family,
        } => {
            reconcile(ReconcileArgs {
                prices,
                catalog,
                out,
                db,
                scorer,
                scorer_endpoint,
                bridge_cmd,
                bridge_script,
                fallback_family,
            })
            .await
        }
        Command::Report { run, db, out } => report(&run, db, out).await,
        Command::List { db } => list(db).await,
        Command::Config { action } => config_command(action),
    }
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

struct ReconcileArgs {
    prices: PathBuf,
    catalog: PathBuf,
    out: Option<String>,
    db: Option<String>,
    scorer: Option<String>,
    scorer_endpoint: Option<String>,
    bridge_cmd: Option<String>,
    bridge_script: Option<String>,
    fallback_family: Option<String>,
}

async fn reconcile(args: ReconcileArgs) -> Result<()> {
    let app_config = load_config()?;

    let mut matching = MatchingConfig::from(&app_config);
    matching.fallback_family = args.fallback_family;
    matching.validate()?;

    let entries = load_price_entries(&args.prices)?;
    let vehicles = load_catalog_vehicles(&args.catalog)?;
    info!(
        entries = entries.len(),
        vehicles = vehicles.len(),
        "inputs loaded"
    );

    let scorer_kind = args
        .scorer
        .unwrap_or_else(|| app_config.defaults.scorer.clone());
    let scorer = build_scorer(
        &scorer_kind,
        args.scorer_endpoint,
        args.bridge_cmd,
        args.bridge_script,
    )?;

    let progress = BarProgress::new(entries.len() as u64);
    let outcome = reconcile_batch(
        &entries,
        &vehicles,
        &matching,
        &app_config.inheritance,
        scorer.as_ref(),
        &progress,
    )
    .await?;

    persist(&app_config, args.db.as_deref(), &outcome).await?;
    let out_dir = expand_tilde(args.out.as_deref().unwrap_or(&app_config.defaults.output_dir));
    write_artifacts(&out_dir, &outcome)?;

    println!(
        "{}",
        lineup_report::generate_summary(
            &outcome.run_id,
            &outcome.stats,
            outcome.elapsed.as_millis()
        )
    );
    if !outcome.failures.is_empty() {
        println!("{}", lineup_report::generate_failure_report(&outcome.failures));
    }

    Ok(())
}

/// Persist the batch outcome: run record, every spec, every failure.
async fn persist(
    app_config: &AppConfig,
    db_override: Option<&str>,
    outcome: &BatchOutcome,
) -> Result<()> {
    let db_path = expand_tilde(db_override.unwrap_or(&app_config.defaults.db_path));
    let storage = Storage::open(&db_path).await?;
    let run_id = outcome.run_id.to_string();

    storage.insert_run(&run_id).await?;
    for spec in &outcome.specifications {
        storage.insert_product_spec(&run_id, spec).await?;
    }
    for failure in &outcome.failures {
        storage.insert_match_failure(&run_id, failure).await?;
    }
    let stats_json = serde_json::to_string(&outcome.stats)?;
    storage.finish_run(&run_id, &stats_json).await?;

    info!(%run_id, db = %db_path.display(), "run persisted");
    Ok(())
}

/// Write the report artifacts into the output directory.
fn write_artifacts(out_dir: &Path, outcome: &BatchOutcome) -> Result<()> {
    std::fs::create_dir_all(out_dir)?;

    let summary = lineup_report::generate_summary(
        &outcome.run_id,
        &outcome.stats,
        outcome.elapsed.as_millis(),
    );
    let failures = lineup_report::generate_failure_report(&outcome.failures);
    let json = lineup_report::generate_json_report(
        &outcome.run_id,
        &outcome.stats,
        &outcome.specifications,
        &outcome.failures,
    )?;

    for (name, content) in [
        ("summary.txt", summary.as_str()),
        ("failures.txt", failures.as_str()),
        ("report.json", json.as_str()),
    ] {
        std::fs::write(out_dir.join(name), content)?;
    }

    info!(dir = %out_dir.display(), "report artifacts written");
    Ok(())
}

// ---------------------------------------------------------------------------
// Report / list
// ---------------------------------------------------------------------------

async fn report(run_id: &str, db: Option<String>, out: Option<String>) -> Result<()> {
    let app_config = load_config()?;
    let db_path = expand_tilde(db.as_deref().unwrap_or(&app_config.defaults.db_path));
    let storage = Storage::open_readonly(&db_path).await?;

    let runs = storage.list_runs().await?;
    let (_, _, _, stats_json) = runs
        .into_iter()
        .find(|(id, _, _, _)| id == run_id)
        .ok_or_else(|| eyre!("run {run_id} not found in {}", db_path.display()))?;

    let stats: BatchStats = stats_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?
        .unwrap_or_default();

    let specs = storage.list_specs_by_run(run_id).await?;
    let failures = storage.list_failures_by_run(run_id).await?;

    let parsed_run_id: lineup_shared::RunId = run_id.parse()?;
    let summary = lineup_report::generate_summary(&parsed_run_id, &stats, 0);
    println!("{summary}");

    if let Some(out) = out {
        let out_dir = expand_tilde(&out);
        std::fs::create_dir_all(&out_dir)?;
        let json =
            lineup_report::generate_json_report(&parsed_run_id, &stats, &specs, &failures)?;
        std::fs::write(out_dir.join("report.json"), json)?;
        std::fs::write(
            out_dir.join("failures.txt"),
            lineup_report::generate_failure_report(&failures),
        )?;
        println!("Artifacts written to {}", out_dir.display());
    }

    Ok(())
}

async fn list(db: Option<String>) -> Result<()> {
    let app_config = load_config()?;
    let db_path = expand_tilde(db.as_deref().unwrap_or(&app_config.defaults.db_path));
    let storage = Storage::open_readonly(&db_path).await?;

    let runs = storage.list_runs().await?;
    if runs.is_empty() {
        println!("No stored runs.");
        return Ok(());
    }

    for (id, started_at, finished_at, stats_json) in runs {
        let status = if finished_at.is_some() { "done" } else { "running" };
        let rate = stats_json
            .as_deref()
            .and_then(|s| serde_json::from_str::<BatchStats>(s).ok())
            .map(|s| format!("{:.1}%", s.match_success_rate() * 100.0))
            .unwrap_or_else(|| "-".into());
        println!("{id}  {started_at}  {status}  success rate {rate}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_command(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init => {
            let path = init_config()?;
            println!("Config written to {}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config()?;
            println!("# {}", config_file_path()?.display());
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Load the extracted price entries from a JSON file.
fn load_price_entries(path: &Path) -> Result<Vec<PriceEntry>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| eyre!("invalid price entries in {}: {e}", path.display()))
}

/// Load the extracted catalog vehicles from a JSON file.
fn load_catalog_vehicles(path: &Path) -> Result<Vec<CatalogVehicle>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| eyre!("invalid catalog vehicles in {}: {e}", path.display()))
}

/// Build the tier-3 scorer from its kind and flags.
fn build_scorer(
    kind: &str,
    endpoint: Option<String>,
    bridge_cmd: Option<String>,
    bridge_script: Option<String>,
) -> Result<Arc<dyn SimilarityScorer>> {
    match kind {
        "lexical" => Ok(Arc::new(LexicalScorer)),
        "http" => {
            let mut config = HttpScorerConfig::default();
            if let Some(endpoint) = endpoint {
                config.endpoint = endpoint;
            }
            Ok(Arc::new(HttpScorer::new(config)?))
        }
        "bridge" => {
            let config = BridgeScorerConfig {
                bridge_cmd: bridge_cmd.ok_or_else(|| eyre!("--bridge-cmd is required"))?,
                bridge_script: bridge_script
                    .ok_or_else(|| eyre!("--bridge-script is required"))?,
                working_dir: ".".into(),
                scorer_id: "embedding-bridge".into(),
            };
            Ok(Arc::new(BridgeScorer::spawn(&config)?))
        }
        other => Err(eyre!(
            "unknown scorer '{other}' (expected lexical, bridge, or http)"
        )),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Progress bar
// ---------------------------------------------------------------------------

/// Indicatif-backed progress reporter.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }
}

impl ProgressReporter for BarProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn entry_processed(&self, model_code: &str, current: usize, _total: usize) {
        self.bar.set_position(current as u64);
        self.bar.set_message(model_code.to_string());
    }

    fn done(&self, stats: &lineup_shared::BatchStats) {
        self.bar.finish_with_message(format!(
            "{}/{} matched",
            stats.successful_matches, stats.price_entries
        ));
    }
}
