//! Scoring functions for cross-catalog matching.
//!
//! This module contains:
//! - Edit-distance string similarity on normalized text
//! - The weighted composite score between two canonical tracks
//! - Score to confidence bucketing

use serde::Serialize;

use crate::config::MatchConfig;
use crate::models::{CanonicalTrack, MatchConfidence};
use crate::normalize::normalize_for_comparison;

// ============================================================================
// Component Weights
// ============================================================================

// Title and artist dominate; duration only breaks ties.
pub const TITLE_WEIGHT: f64 = 40.0;
pub const ARTIST_WEIGHT: f64 = 35.0;
pub const ALBUM_WEIGHT: f64 = 15.0;

/// Duration within this window earns the full bonus
pub const DURATION_CLOSE_MS: u64 = 3_000;
pub const DURATION_CLOSE_BONUS: f64 = 10.0;

/// Duration within this window earns the partial bonus
pub const DURATION_NEAR_MS: u64 = 5_000;
pub const DURATION_NEAR_BONUS: f64 = 5.0;

pub const MAX_SCORE: u32 = 100;

// ============================================================================
// String Similarity
// ============================================================================

/// Classic Levenshtein distance (unit cost insert/delete/substitute) over chars.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Similarity of two strings in [0, 1] after normalization.
///
/// 1.0 when the normalized forms are identical, 0.0 when either is empty,
/// otherwise `1 - distance / max(len)`.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_for_comparison(a);
    let b = normalize_for_comparison(b);

    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    1.0 - levenshtein_distance(&a, &b) as f64 / max_len as f64
}

/// Similarity for a field that may be missing on either side.
/// Missing (or blank after normalization) contributes nothing.
fn field_similarity(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b))
            if !normalize_for_comparison(a).is_empty() && !normalize_for_comparison(b).is_empty() =>
        {
            string_similarity(a, b)
        }
        _ => 0.0,
    }
}

// ============================================================================
// Duration Scoring
// ============================================================================

/// Tie-breaker bonus for close durations. Unknown (0) durations earn nothing.
pub fn duration_score(a_ms: u64, b_ms: u64) -> f64 {
    if a_ms == 0 || b_ms == 0 {
        return 0.0;
    }
    match a_ms.abs_diff(b_ms) {
        d if d <= DURATION_CLOSE_MS => DURATION_CLOSE_BONUS,
        d if d <= DURATION_NEAR_MS => DURATION_NEAR_BONUS,
        _ => 0.0,
    }
}

// ============================================================================
// Composite Scoring
// ============================================================================

/// Per-component contributions of a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub title: f64,
    pub artist: f64,
    pub album: f64,
    pub duration: f64,
}

impl ScoreBreakdown {
    /// Rounded total clamped to 0-100.
    pub fn total(&self) -> u32 {
        let sum = self.title + self.artist + self.album + self.duration;
        sum.round().clamp(0.0, MAX_SCORE as f64) as u32
    }
}

pub fn score_breakdown(a: &CanonicalTrack, b: &CanonicalTrack) -> ScoreBreakdown {
    ScoreBreakdown {
        title: field_similarity(Some(&a.name), Some(&b.name)) * TITLE_WEIGHT,
        artist: field_similarity(a.primary_artist(), b.primary_artist()) * ARTIST_WEIGHT,
        album: field_similarity(a.album_name.as_deref(), b.album_name.as_deref()) * ALBUM_WEIGHT,
        duration: duration_score(a.duration_ms, b.duration_ms),
    }
}

/// Weighted similarity of two tracks, 0-100.
pub fn composite_score(a: &CanonicalTrack, b: &CanonicalTrack) -> u32 {
    score_breakdown(a, b).total()
}

// ============================================================================
// Confidence
// ============================================================================

/// Bucket a metadata score: high at or above the high-confidence cutoff,
/// medium at or above the acceptance threshold, low below it.
pub fn confidence_for_score(score: u32, config: &MatchConfig) -> MatchConfidence {
    if score >= config.high_confidence_threshold {
        MatchConfidence::High
    } else if score >= config.accept_threshold {
        MatchConfidence::Medium
    } else {
        MatchConfidence::Low
    }
}

/// Check if two album names are the same after normalization.
pub fn albums_match(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a = normalize_for_comparison(a);
            !a.is_empty() && a == normalize_for_comparison(b)
        }
        _ => false,
    }
}
