use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use energy_pipeline::{
    config::AppConfig,
    observability,
    sinks::{convert_batch_to_jsonl, convert_jsonl_to_columnar, CsvTableWriter},
    sources::list_files,
};

/// Export readings documents as canonical JSONL, one file per document.
#[derive(Parser, Debug)]
#[command(name = "export-jsonl")]
struct Args {
    /// Documents or directories of `*.json` documents; defaults to
    /// `paths.raw_dir`.
    inputs: Vec<PathBuf>,
    /// Defaults to `paths.processed_dir`.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Also write each exported file as a CSV table beside it.
    #[arg(long)]
    table: bool,
}

fn main() -> Result<()> {
    observability::init_tracing();

    let args = Args::parse();
    let cfg = AppConfig::load()?;

    let inputs = if args.inputs.is_empty() {
        vec![cfg.paths.raw_dir]
    } else {
        args.inputs
    };
    let mut documents = Vec::new();
    for input in inputs {
        if input.is_dir() {
            documents.extend(list_files(&input, "json").with_context(|| format!("listing {}", input.display()))?);
        } else {
            documents.push(input);
        }
    }

    let output_dir = args.output_dir.unwrap_or(cfg.paths.processed_dir);
    let exported = convert_batch_to_jsonl(&documents, &output_dir);
    tracing::info!(documents = documents.len(), exported = exported.len(), "export finished");

    if args.table {
        for path in &exported {
            let table = path.with_extension("csv");
            convert_jsonl_to_columnar(path, &mut CsvTableWriter::new(&table))
                .with_context(|| format!("writing table {}", table.display()))?;
        }
    }
    Ok(())
}
