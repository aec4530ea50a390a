//! Progress bars and tail-friendly progress logging.
//!
//! In log-only mode bars are hidden and periodic `[phase] n/total (pct%)`
//! lines are logged instead.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::models::ProgressEvent;

/// Global flag for log-only mode (set from args in each binary)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Format duration in human-readable format
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})";
const SPINNER_TEMPLATE: &str = "{msg} {spinner} [{elapsed_precise}]";

/// Create a progress bar with consistent styling.
/// In log-only mode, the progress bar is hidden.
pub fn create_progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(msg.to_string());
    pb
}

/// Create a spinner for indeterminate progress.
/// In log-only mode, the spinner is hidden.
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb.set_message(msg.to_string());
    pb
}

/// True when a log line is due at `current` for the given interval.
pub fn should_log(current: u64, total: u64, interval: u64) -> bool {
    interval > 0 && (current % interval == 0 || current == total)
}

/// Log progress periodically for tail-friendly output.
/// Only logs when in log-only mode and at specified intervals.
pub fn log_progress(phase: &str, current: u64, total: u64, interval: u64) {
    if is_log_only() && should_log(current, total, interval) {
        let pct = if total == 0 {
            100.0
        } else {
            100.0 * current as f64 / total as f64
        };
        tracing::info!("[{}] {}/{} ({:.1}%)", phase, current, total, pct);
    }
}

// ============================================================================
// Batch Progress
// ============================================================================

/// Renders batch [`ProgressEvent`]s on a bar (or as log lines).
pub struct BatchProgress {
    bar: ProgressBar,
    phase: String,
    log_interval: u64,
}

impl BatchProgress {
    pub fn new(phase: &str, total: usize) -> Self {
        let total = total as u64;
        Self {
            bar: create_progress_bar(total, phase),
            phase: phase.to_string(),
            log_interval: (total / 20).max(1),
        }
    }

    pub fn observe(&self, event: &ProgressEvent) {
        self.bar.set_position(event.current as u64);
        self.bar.set_message(format!("{}: {}", self.phase, describe(event)));
        log_progress(
            &self.phase,
            event.current as u64,
            event.total as u64,
            self.log_interval,
        );
    }

    pub fn finish(&self, msg: &str) {
        self.bar.finish_with_message(format!("{}: {}", self.phase, msg));
    }
}

/// "Title - Artist" for the bar message.
fn describe(event: &ProgressEvent) -> String {
    match &event.primary_artist {
        Some(artist) => format!("{} - {}", event.track_name, artist),
        None => event.track_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1.5h");
    }

    #[test]
    fn test_should_log() {
        assert!(should_log(10, 100, 10));
        assert!(!should_log(11, 100, 10));
        assert!(should_log(7, 7, 10));
        assert!(!should_log(5, 10, 0));
    }

    #[test]
    fn test_describe() {
        let mut event = ProgressEvent {
            current: 1,
            total: 2,
            track_name: "Blinding Lights".to_string(),
            primary_artist: Some("The Weeknd".to_string()),
        };
        assert_eq!(describe(&event), "Blinding Lights - The Weeknd");
        event.primary_artist = None;
        assert_eq!(describe(&event), "Blinding Lights");
    }

    #[test]
    fn test_batch_progress_tracks_position() {
        let progress = BatchProgress::new("Resolving", 3);
        progress.bar.set_draw_target(ProgressDrawTarget::hidden());
        progress.observe(&ProgressEvent {
            current: 2,
            total: 3,
            track_name: "Song".to_string(),
            primary_artist: None,
        });
        assert_eq!(progress.bar.position(), 2);
        assert_eq!(progress.log_interval, 1);
    }
}
