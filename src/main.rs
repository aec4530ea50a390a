use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use track_resolver::batch::{resolve_batch, BatchHooks};
use track_resolver::catalog::SqliteCatalog;
use track_resolver::config::MatchConfig;
use track_resolver::diagnostics::init_logging;
use track_resolver::models::BatchReport;
use track_resolver::progress::{create_spinner, format_duration, set_log_only, BatchProgress};
use track_resolver::records::{parse_canonical_tracks, CatalogFormat};
use track_resolver::resolver::Resolver;
use track_resolver::safety::validate_output_path;

#[derive(Parser)]
#[command(name = "track-resolver")]
#[command(about = "Resolve a playlist export against a target catalog snapshot")]
struct Args {
    /// JSON array of source-catalog track records
    source: PathBuf,

    /// Where to write the batch report (JSON)
    output: PathBuf,

    /// Shape of the source records (apple-music, spotify, export)
    #[arg(long, default_value = "export")]
    format: CatalogFormat,

    /// Target catalog snapshot built by build-catalog
    #[arg(long)]
    catalog: PathBuf,

    /// JSON match config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    storefront: Option<String>,

    /// Worker threads (1 = sequential)
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    accept_threshold: Option<u32>,

    /// Hide progress bars and log progress lines instead
    #[arg(long)]
    log_only: bool,
}

fn load_config(args: &Args) -> Result<MatchConfig> {
    let mut config = match &args.config {
        Some(path) => MatchConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => MatchConfig::default(),
    };

    if let Some(storefront) = &args.storefront {
        config.storefront = storefront.clone();
    }
    if let Some(workers) = args.workers {
        config.concurrency = workers;
    }
    if let Some(threshold) = args.accept_threshold {
        config.accept_threshold = threshold;
    }
    config.validate().context("Invalid match config")?;
    Ok(config)
}

fn print_summary(report: &BatchReport, elapsed: std::time::Duration) {
    println!("\n{:=<60}", "");
    println!("Resolution {}", if report.cancelled { "cancelled" } else { "complete!" });
    println!("  Tracks:       {}", report.total());
    println!(
        "  Matched:      {} ({:.1}%)",
        report.matched.len(),
        report.match_rate()
    );
    println!("  Needs review: {}", report.needs_review().count());
    println!("  Unavailable:  {}", report.unavailable.len());
    println!("  Errors:       {}", report.errors.len());
    println!("  Elapsed:      {}", format_duration(elapsed));
    println!("{:=<60}", "");
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);
    init_logging("info").context("Failed to initialize logging")?;

    validate_output_path(&args.output, "json", &[&args.source, &args.catalog])?;
    let config = load_config(&args)?;
    let start = Instant::now();

    let spinner = create_spinner("Phase 1: Reading source tracks");
    let raw = std::fs::read_to_string(&args.source)
        .with_context(|| format!("Failed to read {:?}", args.source))?;
    let tracks = parse_canonical_tracks(args.format, &raw)
        .with_context(|| format!("Failed to parse {} records", args.format))?;
    spinner.finish_with_message(format!("Phase 1: Read {} tracks", tracks.len()));

    tracing::info!("Opening catalog snapshot: {:?}", args.catalog);
    let catalog = SqliteCatalog::open(&args.catalog).context("Failed to open catalog snapshot")?;
    let resolver = Resolver::new(catalog, config);

    let progress = BatchProgress::new("Phase 2: Resolving", tracks.len());
    let report = resolve_batch(
        &resolver,
        &tracks,
        BatchHooks::new().on_progress(|event| progress.observe(event)),
    )
    .context("Batch failed")?;
    progress.finish(&format!("{} matched", report.matched.len()));

    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&args.output, json)
        .with_context(|| format!("Failed to write report {:?}", args.output))?;

    print_summary(&report, start.elapsed());
    Ok(())
}
