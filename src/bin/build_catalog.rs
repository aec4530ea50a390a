//! Import a JSON dump of target-catalog records into a SQLite snapshot.
//!
//! Phases: read + convert, write rows, build the FTS index, optimize.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use track_resolver::catalog::{CatalogCapability, SqliteCatalog};
use track_resolver::config::DEFAULT_STOREFRONT;
use track_resolver::diagnostics::init_logging;
use track_resolver::progress::{
    create_progress_bar, create_spinner, format_duration, log_progress, set_log_only,
};
use track_resolver::records::{parse_canonical_tracks, CatalogFormat};
use track_resolver::safety::validate_output_path;

#[derive(Parser)]
#[command(name = "build-catalog")]
#[command(about = "Build a searchable catalog snapshot from a JSON record dump")]
struct Args {
    /// JSON array of catalog records
    source: PathBuf,

    /// Snapshot to create (.sqlite3)
    output: PathBuf,

    #[arg(long, default_value = "spotify")]
    format: CatalogFormat,

    #[arg(long, default_value = DEFAULT_STOREFRONT)]
    storefront: String,

    /// Run a test search against the finished snapshot
    #[arg(long)]
    test: Option<String>,

    /// Hide progress bars and log progress lines instead
    #[arg(long)]
    log_only: bool,
}

fn test_search(catalog: &SqliteCatalog, storefront: &str, query: &str) -> Result<()> {
    println!("\nSearch results for '{}':", query);
    println!("{:-<80}", "");

    let found = catalog.search_by_text(query, storefront, 10, Duration::from_secs(5))?;
    if found.is_empty() {
        println!("No results found.");
    }
    for track in found {
        println!(
            "[{}] {} ({}) [{}s] isrc={}",
            track.id.as_deref().unwrap_or("-"),
            track.display_label(),
            track.album_name.as_deref().unwrap_or("Unknown"),
            track.duration_ms / 1000,
            track.isrc.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);
    init_logging("info").context("Failed to initialize logging")?;

    validate_output_path(&args.output, "sqlite3", &[&args.source])?;
    let start = Instant::now();

    let spinner = create_spinner("Phase 1: Reading records");
    let raw = std::fs::read_to_string(&args.source)
        .with_context(|| format!("Failed to read {:?}", args.source))?;
    let tracks = parse_canonical_tracks(args.format, &raw)
        .with_context(|| format!("Failed to parse {} records", args.format))?;
    drop(raw);
    spinner.finish_with_message(format!("Phase 1: Read {} records", tracks.len()));

    if args.output.exists() {
        std::fs::remove_file(&args.output).context("Failed to remove existing output file")?;
    }

    tracing::info!("Creating catalog snapshot: {:?}", args.output);
    let catalog = SqliteCatalog::create(&args.output).context("Failed to create snapshot")?;

    let total = tracks.len() as u64;
    let pb = create_progress_bar(total, "Phase 2: Writing tracks");
    let mut written = 0u64;
    catalog
        .insert_tracks(&args.storefront, &tracks, |n| {
            written += n as u64;
            pb.set_position(written);
            log_progress("Phase 2", written, total, 100_000);
        })
        .context("Failed to write tracks")?;
    pb.finish_with_message(format!("Phase 2: Wrote {} tracks", written));

    let spinner = create_spinner("Phase 3: Building FTS index");
    catalog.rebuild_search_index().context("Failed to build FTS index")?;
    spinner.finish_with_message("Phase 3: FTS index built");

    let spinner = create_spinner("Phase 4: Optimizing database");
    catalog.optimize().context("Failed to optimize snapshot")?;
    spinner.finish_with_message("Phase 4: Database optimized");

    let file_size = std::fs::metadata(&args.output)?.len();

    println!("\n{:=<60}", "");
    println!("Snapshot complete!");
    println!("  Tracks: {}", catalog.track_count()?);
    println!("  Storefront: {}", args.storefront);
    println!("  Output size: {:.2} MB", file_size as f64 / 1_048_576.0);
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    if let Some(query) = args.test {
        test_search(&catalog, &args.storefront, &query)?;
    }

    Ok(())
}
