use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use energy_client::api::{Credentials, GlowmarktClient};
use energy_pipeline::{
    config::AppConfig,
    get_historical_readings, observability,
    pipeline::{batch::parse_iso_instant, HistoricalRequest},
    sinks::write_document,
    sources::{calendar_month_range, document_file_name, persisted_document, select_resource},
};
use time::OffsetDateTime;

/// Retrieve a resource's readings over a date range and persist them as one
/// JSON document.
#[derive(Parser, Debug)]
#[command(name = "energy-pipeline")]
struct Args {
    #[arg(long, env = "GLOWMARKT_USERNAME")]
    username: Option<String>,
    #[arg(long, env = "GLOWMARKT_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[arg(long, env = "GLOWMARKT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Virtual entity id or name; first entity when omitted.
    #[arg(long)]
    entity: Option<String>,
    /// Resource id, name or classifier; first consumption resource when omitted.
    #[arg(long)]
    resource: Option<String>,

    /// Range start (ISO 8601). Requires --end.
    #[arg(long, requires = "end")]
    start: Option<String>,
    #[arg(long, requires = "start")]
    end: Option<String>,
    /// Without --start/--end, fetch the whole calendar month this many months
    /// back (0 is the current month).
    #[arg(long, default_value_t = 1, conflicts_with = "start")]
    months_back: u32,

    #[arg(long)]
    period: Option<String>,
    #[arg(long)]
    function: Option<String>,
    /// Timezone offset in minutes passed through to the API.
    #[arg(long, allow_hyphen_values = true)]
    offset: Option<i32>,
    #[arg(long)]
    window_days: Option<i64>,

    /// Directory for the persisted document; defaults to `paths.raw_dir`.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args = Args::parse();
    let cfg = AppConfig::load()?;

    if args.token.is_none() && (args.username.is_none() || args.password.is_none()) {
        bail!("either a token or a username and password are required (GLOWMARKT_TOKEN or GLOWMARKT_USERNAME/GLOWMARKT_PASSWORD)");
    }
    let credentials = Credentials {
        username: args.username,
        password: args.password,
        token: args.token,
    };
    let client = GlowmarktClient::new(cfg.client_options(), credentials).context("building API client")?;

    let (start, end) = match (&args.start, &args.end) {
        (Some(start), Some(end)) => (parse_iso_instant(start)?, parse_iso_instant(end)?),
        _ => calendar_month_range(OffsetDateTime::now_utc().date(), args.months_back)?,
    };

    let resource = select_resource(&client, args.entity.as_deref(), args.resource.as_deref())
        .await
        .context("selecting resource")?;

    let request = HistoricalRequest::new(resource.resource_id.clone(), start, end)
        .with_period(args.period.unwrap_or(cfg.retrieval.period))
        .with_function(args.function.unwrap_or(cfg.retrieval.function))
        .with_offset(args.offset.or(cfg.retrieval.offset))
        .with_window_days(args.window_days.unwrap_or(cfg.retrieval.window_days));

    let readings = get_historical_readings(&client, &request)
        .await
        .with_context(|| format!("retrieving readings for {}", resource.resource_id))?;
    if readings.is_empty() {
        tracing::warn!(resource_id = %resource.resource_id, "no readings returned for the range");
    }

    let output_dir = args.output_dir.unwrap_or(cfg.paths.raw_dir);
    let path = output_dir.join(document_file_name(&resource.name, start, end));
    let document = persisted_document(&resource, &request, start, end, readings);
    write_document(&path, &document).with_context(|| format!("writing {}", path.display()))?;

    tracing::info!(path = %path.display(), readings = document.readings.len(), "saved readings");
    Ok(())
}
