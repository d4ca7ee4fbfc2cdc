//! Lineup CLI — price list ↔ catalog reconciliation tool.
//!
//! Matches extracted price-list rows to catalog vehicle pages and produces
//! confidence-scored product specifications plus batch reports.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
