use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use energy_pipeline::{config::AppConfig, merge::ResourceCombiner, observability};

/// Join consumption and cost documents by timestamp.
///
/// By default every matched pair in the input directory becomes its own
/// combined JSONL file. With `--all`, all pairs are joined into one wide file.
#[derive(Parser, Debug)]
#[command(name = "combine-resources")]
struct Args {
    /// Defaults to `paths.processed_dir`.
    #[arg(long)]
    input_dir: Option<PathBuf>,
    /// Defaults to the input directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Combine one explicit pair instead of scanning the directory.
    #[arg(long, requires = "cost", conflicts_with = "all")]
    consumption: Option<PathBuf>,
    #[arg(long, requires = "consumption")]
    cost: Option<PathBuf>,
    /// One wide file across every resource type.
    #[arg(long)]
    all: bool,
    /// Output file for a single pair or for --all.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    observability::init_tracing();

    let args = Args::parse();
    let cfg = AppConfig::load()?;

    let input_dir = args.input_dir.unwrap_or(cfg.paths.processed_dir);
    let combiner = ResourceCombiner::new(args.output_dir.unwrap_or_else(|| input_dir.clone()));

    if let (Some(consumption), Some(cost)) = (&args.consumption, &args.cost) {
        let path = combiner
            .combine_resource_files(consumption, cost, args.output.as_deref())
            .context("combining pair")?;
        tracing::info!(path = %path.display(), "combined pair");
        return Ok(());
    }

    if args.all {
        let path = combiner
            .combine_all_resources(&input_dir, args.output.as_deref())
            .with_context(|| format!("combining all resources in {}", input_dir.display()))?;
        tracing::info!(path = %path.display(), "combined all resources");
    } else {
        let written = combiner
            .combine_batch_resources(&input_dir)
            .with_context(|| format!("combining pairs in {}", input_dir.display()))?;
        if written.is_empty() {
            tracing::warn!(dir = %input_dir.display(), "no consumption/cost pairs combined");
        }
        tracing::info!(files = written.len(), "combined pairs");
    }
    Ok(())
}
