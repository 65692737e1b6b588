use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use energy_pipeline::{
    config::AppConfig,
    merge::{find_matching_resource_files, DayBoundary, ResourceCombiner},
    observability,
};

/// Daily consumption and cost totals, one JSONL file per calendar year.
#[derive(Parser, Debug)]
#[command(name = "yearly-rollup")]
struct Args {
    /// Defaults to `paths.processed_dir`.
    #[arg(long)]
    input_dir: Option<PathBuf>,
    /// Defaults to the input directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// `utc`, `local` or an offset such as `+01:00`; overrides
    /// `rollup.day_boundary`.
    #[arg(long, allow_hyphen_values = true)]
    day_boundary: Option<DayBoundary>,
}

fn main() -> Result<()> {
    observability::init_tracing();

    let args = Args::parse();
    let cfg = AppConfig::load()?;

    let input_dir = args.input_dir.unwrap_or(cfg.paths.processed_dir);
    let combiner = ResourceCombiner::new(args.output_dir.unwrap_or_else(|| input_dir.clone()));
    let boundary = args.day_boundary.unwrap_or(cfg.rollup.day_boundary);

    let pairs = find_matching_resource_files(&input_dir)
        .with_context(|| format!("scanning {}", input_dir.display()))?;
    if pairs.is_empty() {
        tracing::warn!(dir = %input_dir.display(), "no consumption/cost pairs found");
        return Ok(());
    }

    let files = combiner.to_yearly(&pairs, boundary).context("writing yearly rollup")?;
    tracing::info!(pairs = pairs.len(), years = files.len(), ?boundary, "rollup finished");
    Ok(())
}
