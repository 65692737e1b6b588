use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use energy_client::domain::ResourceKind;
use energy_pipeline::{
    config::AppConfig,
    observability,
    sources::{detect_resource_type, N3rgyCsvSource},
};

/// Convert n3rgy CSV exports into persisted readings documents.
#[derive(Parser, Debug)]
#[command(name = "convert-n3rgy-csv")]
struct Args {
    /// Directory of `*.csv` exports; defaults to `paths.csv_source_dir`.
    #[arg(long)]
    source_dir: Option<PathBuf>,
    /// Defaults to `paths.processed_dir`.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Convert only this export instead of the whole directory.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Resource type of --file (electricity or gas); guessed from its name
    /// when omitted.
    #[arg(long, requires = "file")]
    resource_type: Option<String>,
    /// Skip the cost column.
    #[arg(long)]
    no_cost: bool,
    /// Also write one wide JSONL over every produced document.
    #[arg(long, conflicts_with = "file")]
    combine: bool,
}

fn main() -> Result<()> {
    observability::init_tracing();

    let args = Args::parse();
    let cfg = AppConfig::load()?;

    let source = N3rgyCsvSource::new(
        args.source_dir.unwrap_or(cfg.paths.csv_source_dir),
        args.output_dir.unwrap_or(cfg.paths.processed_dir),
    );

    let produced: Vec<PathBuf> = match &args.file {
        Some(file) => {
            let kind = match &args.resource_type {
                Some(t) => ResourceKind::parse(t).ok_or_else(|| anyhow!("unknown resource type '{t}'"))?,
                None => {
                    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
                    detect_resource_type(stem)?
                }
            };
            let out = source
                .transform(file, kind, !args.no_cost)
                .with_context(|| format!("converting {}", file.display()))?;
            std::iter::once(out.consumption).chain(out.cost).collect()
        }
        None => source
            .process_all_files(!args.no_cost, args.combine)
            .context("converting csv exports")?,
    };

    tracing::info!(documents = produced.len(), output_dir = %source.output_dir().display(), "conversion finished");
    Ok(())
}
