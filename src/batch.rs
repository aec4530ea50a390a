//! Batch orchestration: resolve many tracks, bucket the outcomes.
//!
//! Sequential when `concurrency == 1`. Otherwise a rayon pool of that size
//! resolves tracks while the calling thread collects index-tagged outcomes
//! from a channel and releases them in input order.
//!
//! A single track never aborts the batch: resolver errors and panics are
//! recorded in the `errors` bucket. Only setup defects are returned as `Err`.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::CatalogCapability;
use crate::diagnostics::Diagnostics;
use crate::error::{BatchError, ResolveError};
use crate::models::{BatchReport, CanonicalTrack, ProgressEvent, ResolutionOutcome};
use crate::resolver::Resolver;

// ============================================================================
// Hooks
// ============================================================================

/// Cooperative cancellation flag, shared between the caller and the batch.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type ProgressFn<'a> = Box<dyn FnMut(&ProgressEvent) + 'a>;

/// Optional caller hooks for [`resolve_batch`].
#[derive(Default)]
pub struct BatchHooks<'a> {
    on_progress: Option<ProgressFn<'a>>,
    stop: Option<&'a StopSignal>,
}

impl<'a> BatchHooks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per resolved track, in input order, on the calling thread.
    pub fn on_progress(mut self, f: impl FnMut(&ProgressEvent) + 'a) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Checked before each track starts.
    pub fn stop_signal(mut self, stop: &'a StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Resolve every track and bucket the outcomes.
///
/// Fails only when the config is invalid, the catalog reports itself
/// unusable, or the worker pool cannot be built.
pub fn resolve_batch<C: CatalogCapability>(
    resolver: &Resolver<C>,
    tracks: &[CanonicalTrack],
    hooks: BatchHooks<'_>,
) -> Result<BatchReport, BatchError> {
    let config = resolver.config();
    config.validate()?;
    resolver
        .catalog()
        .check()
        .map_err(BatchError::Capability)?;

    if tracks.is_empty() {
        return Ok(BatchReport::default());
    }

    let started = Instant::now();
    let BatchHooks { on_progress, stop } = hooks;
    let mut collector = Collector::new(tracks, on_progress, resolver.diagnostics());

    if config.concurrency <= 1 {
        run_sequential(resolver, tracks, stop, &mut collector);
    } else {
        run_pooled(resolver, tracks, stop, config.concurrency, &mut collector)?;
    }

    let report = collector.finish();
    resolver.diagnostics().info(&format!(
        "batch finished in {:.1}s: {} matched ({} need review), {} unavailable, {} errors{}",
        started.elapsed().as_secs_f64(),
        report.matched.len(),
        report.needs_review().count(),
        report.unavailable.len(),
        report.errors.len(),
        if report.cancelled { ", cancelled" } else { "" }
    ));
    Ok(report)
}

fn run_sequential<C: CatalogCapability>(
    resolver: &Resolver<C>,
    tracks: &[CanonicalTrack],
    stop: Option<&StopSignal>,
    collector: &mut Collector<'_, '_>,
) {
    for (index, track) in tracks.iter().enumerate() {
        if stop.is_some_and(StopSignal::is_stopped) {
            break;
        }
        collector.accept(index, Some(resolve_guarded(resolver, track)));
    }
}

fn run_pooled<C: CatalogCapability>(
    resolver: &Resolver<C>,
    tracks: &[CanonicalTrack],
    stop: Option<&StopSignal>,
    workers: usize,
    collector: &mut Collector<'_, '_>,
) -> Result<(), BatchError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("resolver-{}", i))
        .build()
        .map_err(|e| BatchError::Pool(e.to_string()))?;

    let (tx, rx) = crossbeam_channel::unbounded::<(usize, Option<ResolutionOutcome>)>();

    pool.in_place_scope(|scope| {
        for (index, track) in tracks.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let outcome = if stop.is_some_and(StopSignal::is_stopped) {
                    None
                } else {
                    Some(resolve_guarded(resolver, track))
                };
                // Receiver outlives the scope
                let _ = tx.send((index, outcome));
            });
        }
        drop(tx);

        for (index, outcome) in rx.iter() {
            collector.accept(index, outcome);
        }
    });

    Ok(())
}

// ============================================================================
// Per-Track Guard
// ============================================================================

/// Resolve one track, turning errors and panics into an error outcome.
fn resolve_guarded<C: CatalogCapability>(
    resolver: &Resolver<C>,
    track: &CanonicalTrack,
) -> ResolutionOutcome {
    let error = match catch_unwind(AssertUnwindSafe(|| resolver.resolve(track))) {
        Ok(Ok(outcome)) => return outcome,
        Ok(Err(e)) => e,
        Err(payload) => ResolveError::Panicked(panic_message(payload.as_ref())),
    };
    resolver.diagnostics().error(&format!(
        "failed to resolve '{}': {}",
        track.display_label(),
        error
    ));
    ResolutionOutcome::failed(track.clone(), error.to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Ordered Collector
// ============================================================================

/// Reorder buffer. Outcomes arrive in any order; they are bucketed and
/// reported to the progress hook strictly in input order.
struct Collector<'t, 'h> {
    tracks: &'t [CanonicalTrack],
    on_progress: Option<ProgressFn<'h>>,
    diagnostics: &'t dyn Diagnostics,
    pending: BTreeMap<usize, Option<ResolutionOutcome>>,
    next: usize,
    resolved: usize,
    report: BatchReport,
}

impl<'t, 'h> Collector<'t, 'h> {
    fn new(
        tracks: &'t [CanonicalTrack],
        on_progress: Option<ProgressFn<'h>>,
        diagnostics: &'t dyn Diagnostics,
    ) -> Self {
        Self {
            tracks,
            on_progress,
            diagnostics,
            pending: BTreeMap::new(),
            next: 0,
            resolved: 0,
            report: BatchReport::default(),
        }
    }

    /// `None` marks a track skipped by the stop signal.
    fn accept(&mut self, index: usize, outcome: Option<ResolutionOutcome>) {
        self.pending.insert(index, outcome);
        while let Some(outcome) = self.pending.remove(&self.next) {
            let index = self.next;
            self.next += 1;
            if let Some(outcome) = outcome {
                self.release(index, outcome);
            }
        }
    }

    fn release(&mut self, index: usize, outcome: ResolutionOutcome) {
        self.resolved += 1;
        let event = ProgressEvent {
            current: self.resolved,
            total: self.tracks.len(),
            track_name: outcome.source_track.name.clone(),
            primary_artist: outcome.source_track.primary_artist().map(str::to_string),
        };
        self.report.push(index, outcome);

        if let Some(callback) = self.on_progress.as_mut() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                self.diagnostics.error(&format!(
                    "progress callback panicked at {}/{}: {}",
                    event.current,
                    event.total,
                    panic_message(payload.as_ref())
                ));
            }
        }
    }

    fn finish(self) -> BatchReport {
        let mut report = self.report;
        report.cancelled = self.resolved < self.tracks.len();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::config::MatchConfig;
    use crate::error::LookupError;
    use crate::models::{MatchMethod, ResolutionStatus, UnavailableReason};
    use crate::test_support::{track, MockCatalog, RecordingDiagnostics};
    use std::time::Duration;

    fn resolver_with(
        catalog: MockCatalog,
        concurrency: usize,
    ) -> (Resolver<MockCatalog>, Arc<RecordingDiagnostics>) {
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let config = MatchConfig {
            concurrency,
            ..MatchConfig::default()
        };
        let resolver = Resolver::new(catalog, config).with_diagnostics(diagnostics.clone());
        (resolver, diagnostics)
    }

    /// Every ISRC resolves to a copy of a track with that ISRC as its id,
    /// except "BOOM", which panics inside the catalog.
    fn echo_catalog() -> MockCatalog {
        MockCatalog::empty().on_isrc(|isrc| {
            if isrc == "BOOM" {
                panic!("catalog client crashed");
            }
            Ok(vec![track("Song", "Artist").with_id(isrc)])
        })
    }

    fn collect_progress(
        resolver: &Resolver<MockCatalog>,
        tracks: &[CanonicalTrack],
    ) -> (BatchReport, Vec<ProgressEvent>) {
        let mut events = Vec::new();
        let report = resolve_batch(
            resolver,
            tracks,
            BatchHooks::new().on_progress(|e| events.push(e.clone())),
        )
        .unwrap();
        (report, events)
    }

    #[test]
    fn test_three_tracks_with_failing_middle() {
        let tracks = vec![
            track("One", "A").with_isrc("ISRC1"),
            track("Two", "B").with_isrc("BOOM"),
            track("Three", "C").with_isrc("ISRC3"),
        ];
        let (resolver, diagnostics) = resolver_with(echo_catalog(), 1);

        let (report, events) = collect_progress(&resolver, &tracks);
        assert_eq!(report.total(), 3);
        assert_eq!(report.matched.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].index, 1);
        assert_eq!(report.errors[0].source_track.name, "Two");
        assert!(report.errors[0].error.contains("catalog client crashed"));
        assert!(!report.cancelled);

        let currents: Vec<_> = events.iter().map(|e| e.current).collect();
        assert_eq!(currents, vec![1, 2, 3]);
        assert!(events.iter().all(|e| e.total == 3));
        assert_eq!(events[1].track_name, "Two");
        assert_eq!(events[1].primary_artist.as_deref(), Some("B"));
        assert_eq!(diagnostics.count("error"), 1);
    }

    #[test]
    fn test_empty_batch() {
        let (resolver, _) = resolver_with(echo_catalog(), 1);
        let (report, events) = collect_progress(&resolver, &[]);
        assert_eq!(report, BatchReport::default());
        assert!(events.is_empty());
        assert!(resolver.catalog().recorded_calls().is_empty());
    }

    #[test]
    fn test_buckets() {
        let tracks = vec![
            track("One", "A").with_isrc("ISRC1"),
            track("Nowhere", "Nobody"),
            CanonicalTrack::default(),
        ];
        let (resolver, _) = resolver_with(echo_catalog(), 1);

        let report = resolve_batch(&resolver, &tracks, BatchHooks::default()).unwrap();
        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.matched[0].primary.method, MatchMethod::Isrc);
        assert_eq!(report.matched[0].status, ResolutionStatus::Matched);
        assert_eq!(report.unavailable.len(), 1);
        assert_eq!(report.unavailable[0].index, 1);
        assert_eq!(report.unavailable[0].reason, UnavailableReason::NotFound);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].error.contains("malformed"));
    }

    #[test]
    fn test_lookup_errors_are_not_batch_errors() {
        let catalog = MockCatalog::empty()
            .on_isrc(|_| Err(LookupError::Transport("503".to_string())))
            .on_search(|_| Err(LookupError::Transport("503".to_string())));
        let tracks = vec![track("One", "A").with_isrc("ISRC1"), track("Two", "B")];
        let (resolver, diagnostics) = resolver_with(catalog, 1);

        let report = resolve_batch(&resolver, &tracks, BatchHooks::default()).unwrap();
        assert_eq!(report.unavailable.len(), 2);
        assert!(report.errors.is_empty());
        assert_eq!(diagnostics.count("warn"), 3);
    }

    #[test]
    fn test_pooled_preserves_input_order() {
        // Earlier tracks sleep longer, so they finish last
        let catalog = MockCatalog::empty().on_isrc(|isrc| {
            let n: u64 = isrc.trim_start_matches('T').parse().unwrap();
            std::thread::sleep(Duration::from_millis((20 - n) * 3));
            Ok(vec![track("Song", "Artist").with_id(isrc)])
        });
        let tracks: Vec<_> = (0..20)
            .map(|i| track(&format!("Song {}", i), "Artist").with_isrc(format!("T{}", i)))
            .collect();
        let (resolver, _) = resolver_with(catalog, 4);

        let (report, events) = collect_progress(&resolver, &tracks);
        assert_eq!(report.matched.len(), 20);
        let indices: Vec<_> = report.matched.iter().map(|m| m.index).collect();
        assert_eq!(indices, (0..20).collect::<Vec<_>>());
        for (i, entry) in report.matched.iter().enumerate() {
            assert_eq!(entry.primary.track.id, Some(format!("T{}", i)));
        }

        let currents: Vec<_> = events.iter().map(|e| e.current).collect();
        assert_eq!(currents, (1..=20).collect::<Vec<_>>());
        let names: Vec<_> = events.iter().map(|e| e.track_name.clone()).collect();
        let expected: Vec<_> = (0..20).map(|i| format!("Song {}", i)).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_pooled_panic_is_recorded() {
        let tracks = vec![
            track("One", "A").with_isrc("ISRC1"),
            track("Two", "B").with_isrc("BOOM"),
            track("Three", "C").with_isrc("ISRC3"),
        ];
        let (resolver, _) = resolver_with(echo_catalog(), 3);

        let report = resolve_batch(&resolver, &tracks, BatchHooks::default()).unwrap();
        assert_eq!(report.matched.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].index, 1);
    }

    #[test]
    fn test_stop_signal_sequential() {
        let stop = StopSignal::new();
        let tracks: Vec<_> = (0..5)
            .map(|i| track("Song", "Artist").with_isrc(format!("ISRC{}", i)))
            .collect();
        let (resolver, _) = resolver_with(echo_catalog(), 1);

        let mut seen = 0;
        let report = resolve_batch(
            &resolver,
            &tracks,
            BatchHooks::new()
                .stop_signal(&stop)
                .on_progress(|e| {
                    seen = e.current;
                    if e.current == 2 {
                        stop.stop();
                    }
                }),
        )
        .unwrap();

        assert_eq!(seen, 2);
        assert_eq!(report.matched.len(), 2);
        assert!(report.cancelled);
        assert_eq!(resolver.catalog().recorded_calls().len(), 2);
    }

    #[test]
    fn test_stop_signal_before_pooled_start() {
        let stop = StopSignal::new();
        stop.stop();
        let tracks: Vec<_> = (0..8)
            .map(|i| track("Song", "Artist").with_isrc(format!("ISRC{}", i)))
            .collect();
        let (resolver, _) = resolver_with(echo_catalog(), 4);

        let (report, events) = {
            let mut events = Vec::new();
            let report = resolve_batch(
                &resolver,
                &tracks,
                BatchHooks::new()
                    .stop_signal(&stop)
                    .on_progress(|e| events.push(e.clone())),
            )
            .unwrap();
            (report, events)
        };

        assert_eq!(report.total(), 0);
        assert!(report.cancelled);
        assert!(events.is_empty());
        assert!(resolver.catalog().recorded_calls().is_empty());
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let (resolver, _) = resolver_with(echo_catalog(), 0);
        let err = resolve_batch(&resolver, &[track("Song", "Artist")], BatchHooks::default())
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfig(_)));
    }

    #[test]
    fn test_capability_check_is_fatal() {
        let catalog = echo_catalog().failing_check(LookupError::Storage("no such table".to_string()));
        let (resolver, _) = resolver_with(catalog, 1);
        let err = resolve_batch(&resolver, &[], BatchHooks::default()).unwrap_err();
        assert!(matches!(err, BatchError::Capability(_)));
    }

    #[test]
    fn test_panicking_progress_callback() {
        let tracks = vec![
            track("One", "A").with_isrc("ISRC1"),
            track("Two", "B").with_isrc("ISRC2"),
        ];
        let (resolver, diagnostics) = resolver_with(echo_catalog(), 1);

        let report = resolve_batch(
            &resolver,
            &tracks,
            BatchHooks::new().on_progress(|e| {
                if e.current == 1 {
                    panic!("renderer exploded");
                }
            }),
        )
        .unwrap();
        assert_eq!(report.matched.len(), 2);
        assert!(diagnostics
            .lines()
            .iter()
            .any(|l| l.starts_with("error:") && l.contains("renderer exploded")));
    }

    #[test]
    fn test_pooled_matches_sequential_on_sqlite_snapshot() {
        let targets: Vec<_> = (0..40)
            .map(|i| {
                track(&format!("Anthem Number {}", i), &format!("Band {}", i))
                    .with_id(format!("sp-{}", i))
                    .with_album(format!("Album {}", i))
                    .with_duration_ms(180_000 + i as u64 * 1_000)
            })
            .collect();
        let catalog = SqliteCatalog::from_tracks("us", &targets).unwrap();
        let sources: Vec<_> = targets
            .iter()
            .map(|t| CanonicalTrack { id: None, ..t.clone() })
            .collect();

        let run = |concurrency: usize| {
            let config = MatchConfig {
                concurrency,
                search_timeout_ms: 200,
                ..MatchConfig::default()
            };
            let resolver = Resolver::new(&catalog, config)
                .with_diagnostics(Arc::new(RecordingDiagnostics::default()));
            resolve_batch(&resolver, &sources, BatchHooks::default()).unwrap()
        };
        let sequential = run(1);
        let pooled = run(8);

        assert_eq!(sequential.matched.len(), 40);
        assert!(pooled.unavailable.is_empty());
        let ids = |report: &BatchReport| -> Vec<(usize, Option<String>)> {
            report
                .matched
                .iter()
                .map(|m| (m.index, m.primary.track.id.clone()))
                .collect()
        };
        assert_eq!(ids(&pooled), ids(&sequential));
        assert_eq!(pooled.matched[7].primary.track.id.as_deref(), Some("sp-7"));
    }

    #[test]
    fn test_stop_signal_clones_share_state() {
        let stop = StopSignal::new();
        let other = stop.clone();
        assert!(!other.is_stopped());
        stop.stop();
        assert!(other.is_stopped());
    }
}
