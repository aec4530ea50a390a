//! Summarize a batch report written by track-resolver
//!
//! Usage: analyze-report <report.json> [--sample N]

use anyhow::{Context, Result};
use clap::Parser;
use rustc_hash::FxHashMap;
use std::path::PathBuf;

use track_resolver::models::{BatchReport, MatchConfidence, MatchMethod};

#[derive(Parser)]
#[command(name = "analyze-report")]
#[command(about = "Summarize a track-resolver batch report")]
struct Args {
    report: PathBuf,

    /// How many needs-review / unavailable tracks to list
    #[arg(long, default_value = "20")]
    sample: usize,
}

/// Score buckets: label and inclusive lower bound, highest first.
const SCORE_BUCKETS: [(&str, u32); 4] = [("100", 100), ("90-99", 90), ("80-89", 80), ("<80", 0)];

#[derive(Debug, Default, PartialEq)]
struct Summary {
    by_method: FxHashMap<MatchMethod, usize>,
    by_confidence: FxHashMap<MatchConfidence, usize>,
    score_histogram: [usize; SCORE_BUCKETS.len()],
    with_alternatives: usize,
    mean_match_time_ms: f64,
    errors_by_message: Vec<(String, usize)>,
}

fn bucket_for(score: u32) -> usize {
    SCORE_BUCKETS
        .iter()
        .position(|(_, floor)| score >= *floor)
        .unwrap_or(SCORE_BUCKETS.len() - 1)
}

fn summarize(report: &BatchReport) -> Summary {
    let mut summary = Summary::default();
    let mut total_time = 0u64;

    for entry in &report.matched {
        let primary = &entry.primary;
        *summary.by_method.entry(primary.method).or_default() += 1;
        *summary.by_confidence.entry(primary.confidence).or_default() += 1;
        summary.score_histogram[bucket_for(primary.score)] += 1;
        if !entry.alternatives.is_empty() {
            summary.with_alternatives += 1;
        }
        total_time += primary.match_time_ms;
    }
    if !report.matched.is_empty() {
        summary.mean_match_time_ms = total_time as f64 / report.matched.len() as f64;
    }

    let mut errors: FxHashMap<&str, usize> = FxHashMap::default();
    for entry in &report.errors {
        *errors.entry(entry.error.as_str()).or_default() += 1;
    }
    let mut errors: Vec<(String, usize)> =
        errors.into_iter().map(|(m, n)| (m.to_string(), n)).collect();
    errors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    summary.errors_by_message = errors;

    summary
}

fn pct(n: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * n as f64 / total as f64
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.report)
        .with_context(|| format!("Failed to read {:?}", args.report))?;
    let report: BatchReport = serde_json::from_str(&raw).context("Failed to parse batch report")?;
    let summary = summarize(&report);
    let total = report.total();

    println!("\n=== BATCH REPORT ({} tracks{}) ===", total, if report.cancelled { ", cancelled" } else { "" });
    println!();
    println!("Bucket                Count     %");
    println!("─────────────────────────────────────");
    println!("Matched              {:>6}  {:>5.1}%", report.matched.len(), report.match_rate());
    let review = report.needs_review().count();
    println!("  of which review    {:>6}  {:>5.1}%", review, pct(review, total));
    println!("Unavailable          {:>6}  {:>5.1}%", report.unavailable.len(), pct(report.unavailable.len(), total));
    println!("Errors               {:>6}  {:>5.1}%", report.errors.len(), pct(report.errors.len(), total));

    let matched = report.matched.len();
    println!("\nMethod");
    println!("─────────────────────────────────────");
    for method in [MatchMethod::Isrc, MatchMethod::Metadata] {
        let n = summary.by_method.get(&method).copied().unwrap_or(0);
        println!("{:<20} {:>6}  {:>5.1}%", format!("{:?}", method), n, pct(n, matched));
    }

    println!("\nConfidence");
    println!("─────────────────────────────────────");
    for confidence in [MatchConfidence::High, MatchConfidence::Medium, MatchConfidence::Low] {
        let n = summary.by_confidence.get(&confidence).copied().unwrap_or(0);
        println!("{:<20} {:>6}  {:>5.1}%", format!("{:?}", confidence), n, pct(n, matched));
    }

    println!("\nPrimary score");
    println!("─────────────────────────────────────");
    for ((label, _), n) in SCORE_BUCKETS.iter().zip(summary.score_histogram) {
        println!("{:<20} {:>6}  {:>5.1}%", label, n, pct(n, matched));
    }
    println!(
        "\nWith alternatives: {}   Mean match time: {:.1}ms",
        summary.with_alternatives, summary.mean_match_time_ms
    );

    if review > 0 {
        println!("\nNeeds review (first {}):", args.sample.min(review));
        for entry in report.needs_review().take(args.sample) {
            println!(
                "  #{:<5} {}  →  {} [score {}]",
                entry.index,
                entry.source_track.display_label(),
                entry.primary.track.display_label(),
                entry.primary.score
            );
        }
    }

    if !report.unavailable.is_empty() {
        println!("\nUnavailable (first {}):", args.sample.min(report.unavailable.len()));
        for entry in report.unavailable.iter().take(args.sample) {
            println!("  #{:<5} {}", entry.index, entry.source_track.display_label());
        }
    }

    if !summary.errors_by_message.is_empty() {
        println!("\nErrors:");
        for (message, n) in &summary.errors_by_message {
            println!("  {:>5}x {}", n, message);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use track_resolver::models::{CanonicalTrack, MatchCandidate, ResolutionOutcome};

    fn candidate(method: MatchMethod, confidence: MatchConfidence, score: u32) -> MatchCandidate {
        MatchCandidate {
            track: CanonicalTrack::new("Song", vec!["Artist".to_string()]).with_id("t"),
            method,
            confidence,
            score,
            match_time_ms: 10,
        }
    }

    #[test]
    fn test_bucket_for() {
        assert_eq!(bucket_for(100), 0);
        assert_eq!(bucket_for(95), 1);
        assert_eq!(bucket_for(80), 2);
        assert_eq!(bucket_for(12), 3);
    }

    #[test]
    fn test_summarize() {
        let source = CanonicalTrack::new("Song", vec!["Artist".to_string()]);
        let mut report = BatchReport::default();
        report.push(
            0,
            ResolutionOutcome::accepted(
                source.clone(),
                candidate(MatchMethod::Isrc, MatchConfidence::High, 100),
                vec![candidate(MatchMethod::Isrc, MatchConfidence::High, 75)],
            ),
        );
        report.push(
            1,
            ResolutionOutcome::accepted(
                source.clone(),
                candidate(MatchMethod::Metadata, MatchConfidence::Medium, 84),
                vec![],
            ),
        );
        report.push(2, ResolutionOutcome::failed(source.clone(), "boom"));
        report.push(3, ResolutionOutcome::failed(source, "boom"));

        let summary = summarize(&report);
        assert_eq!(summary.by_method[&MatchMethod::Isrc], 1);
        assert_eq!(summary.by_method[&MatchMethod::Metadata], 1);
        assert_eq!(summary.by_confidence[&MatchConfidence::Medium], 1);
        assert_eq!(summary.score_histogram, [1, 0, 1, 0]);
        assert_eq!(summary.with_alternatives, 1);
        assert_eq!(summary.mean_match_time_ms, 10.0);
        assert_eq!(summary.errors_by_message, vec![("boom".to_string(), 2)]);
    }
}
