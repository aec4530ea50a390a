//! Core data models for cross-catalog track resolution.
//!
//! This module contains the canonical track shape, match candidates,
//! per-track resolution outcomes and the aggregated batch report.

use serde::{Deserialize, Serialize};

// ============================================================================
// Canonical Track
// ============================================================================

/// Catalog-agnostic track record.
///
/// Every raw catalog shape is converted into this form at the normalizer
/// boundary; nothing downstream ever sees a catalog's native record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalTrack {
    pub id: Option<String>, // Catalog-assigned id, None before a match is found
    pub name: String,
    pub artists: Vec<String>, // Credited order; first entry is the primary artist
    pub album_name: Option<String>,
    pub duration_ms: u64, // 0 when unknown
    pub isrc: Option<String>,
    pub explicit: bool,
}

impl CanonicalTrack {
    pub fn new(name: impl Into<String>, artists: Vec<String>) -> Self {
        Self {
            name: name.into(),
            artists,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album_name = Some(album.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_isrc(mut self, isrc: impl Into<String>) -> Self {
        self.isrc = Some(isrc.into());
        self
    }

    pub fn with_explicit(mut self, explicit: bool) -> Self {
        self.explicit = explicit;
        self
    }

    /// First credited artist, if any.
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }

    /// Short "Artist - Title" label for logs and progress output.
    pub fn display_label(&self) -> String {
        match self.primary_artist() {
            Some(artist) => format!("{} - {}", artist, self.name),
            None => self.name.clone(),
        }
    }
}

// ============================================================================
// Match Candidates
// ============================================================================

/// Resolution tier that produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchMethod {
    /// Identifier lookup on the recording code
    Isrc,
    /// Free-text search scored by the composite score
    Metadata,
}

/// Coarse confidence bucket used to drive review prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    High,
    Medium,
    Low,
}

/// One possible target-catalog track for a given source track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub track: CanonicalTrack,
    pub method: MatchMethod,
    pub confidence: MatchConfidence,
    pub score: u32,         // 0-100
    pub match_time_ms: u64, // Diagnostics only
}

// ============================================================================
// Resolution Outcome
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// Accepted with high confidence
    Matched,
    /// Accepted, but only with medium confidence
    NeedsReview,
    Unavailable,
    Error,
}

/// Result of resolving one source track. Built once, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub source_track: CanonicalTrack,
    pub primary: Option<MatchCandidate>,
    pub alternatives: Vec<MatchCandidate>,
    pub status: ResolutionStatus,
    pub error: Option<String>,
}

impl ResolutionOutcome {
    /// Accepted match. Status follows the primary's confidence.
    pub fn accepted(
        source_track: CanonicalTrack,
        primary: MatchCandidate,
        alternatives: Vec<MatchCandidate>,
    ) -> Self {
        let status = match primary.confidence {
            MatchConfidence::High => ResolutionStatus::Matched,
            MatchConfidence::Medium | MatchConfidence::Low => ResolutionStatus::NeedsReview,
        };
        Self {
            source_track,
            primary: Some(primary),
            alternatives,
            status,
            error: None,
        }
    }

    pub fn unavailable(source_track: CanonicalTrack) -> Self {
        Self {
            source_track,
            primary: None,
            alternatives: Vec::new(),
            status: ResolutionStatus::Unavailable,
            error: None,
        }
    }

    pub fn failed(source_track: CanonicalTrack, error: impl Into<String>) -> Self {
        Self {
            source_track,
            primary: None,
            alternatives: Vec::new(),
            status: ResolutionStatus::Error,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// Batch Report
// ============================================================================

/// Track resolved to an accepted target-catalog match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchedEntry {
    pub index: usize, // Position in the input batch
    pub source_track: CanonicalTrack,
    #[serde(rename = "match")]
    pub primary: MatchCandidate,
    pub alternatives: Vec<MatchCandidate>,
    pub status: ResolutionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    NotFound,
}

/// Track with no accepted candidate in the target catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnavailableEntry {
    pub index: usize,
    pub source_track: CanonicalTrack,
    pub reason: UnavailableReason,
}

/// Track whose resolution failed outright.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub index: usize,
    pub source_track: CanonicalTrack,
    pub error: String,
}

/// Aggregated result of a batch, every bucket in input order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub matched: Vec<MatchedEntry>,
    pub unavailable: Vec<UnavailableEntry>,
    pub errors: Vec<ErrorEntry>,
    /// Set when a stop signal cut the batch short
    #[serde(default)]
    pub cancelled: bool,
}

impl BatchReport {
    /// Bucket one outcome. Callers must push in input order.
    pub fn push(&mut self, index: usize, outcome: ResolutionOutcome) {
        let ResolutionOutcome {
            source_track,
            primary,
            alternatives,
            status,
            error,
        } = outcome;

        match (status, primary) {
            (ResolutionStatus::Error, _) => self.errors.push(ErrorEntry {
                index,
                source_track,
                error: error.unwrap_or_else(|| "unknown error".to_string()),
            }),
            (ResolutionStatus::Matched | ResolutionStatus::NeedsReview, Some(primary)) => {
                self.matched.push(MatchedEntry {
                    index,
                    source_track,
                    primary,
                    alternatives,
                    status,
                })
            }
            _ => self.unavailable.push(UnavailableEntry {
                index,
                source_track,
                reason: UnavailableReason::NotFound,
            }),
        }
    }

    pub fn total(&self) -> usize {
        self.matched.len() + self.unavailable.len() + self.errors.len()
    }

    /// Matched entries the review UI should confirm.
    pub fn needs_review(&self) -> impl Iterator<Item = &MatchedEntry> {
        self.matched
            .iter()
            .filter(|m| m.status == ResolutionStatus::NeedsReview)
    }

    /// Calculate match rate as a percentage
    pub fn match_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            100.0 * self.matched.len() as f64 / total as f64
        }
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Emitted once per resolved track, in input order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    pub track_name: String,
    pub primary_artist: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(confidence: MatchConfidence) -> MatchCandidate {
        MatchCandidate {
            track: CanonicalTrack::new("Song", vec!["Artist".to_string()]).with_id("t1"),
            method: MatchMethod::Metadata,
            confidence,
            score: 85,
            match_time_ms: 3,
        }
    }

    #[test]
    fn test_accepted_status_follows_confidence() {
        let source = CanonicalTrack::new("Song", vec!["Artist".to_string()]);
        let high = ResolutionOutcome::accepted(source.clone(), candidate(MatchConfidence::High), vec![]);
        let medium = ResolutionOutcome::accepted(source, candidate(MatchConfidence::Medium), vec![]);
        assert_eq!(high.status, ResolutionStatus::Matched);
        assert_eq!(medium.status, ResolutionStatus::NeedsReview);
    }

    #[test]
    fn test_report_buckets_by_status() {
        let source = CanonicalTrack::new("Song", vec![]);
        let mut report = BatchReport::default();
        report.push(
            0,
            ResolutionOutcome::accepted(source.clone(), candidate(MatchConfidence::Medium), vec![]),
        );
        report.push(1, ResolutionOutcome::unavailable(source.clone()));
        report.push(2, ResolutionOutcome::failed(source, "boom"));

        assert_eq!(report.total(), 3);
        assert_eq!(report.matched[0].index, 0);
        assert_eq!(report.unavailable[0].reason, UnavailableReason::NotFound);
        assert_eq!(report.errors[0].error, "boom");
        assert_eq!(report.needs_review().count(), 1);
    }

    #[test]
    fn test_report_json_shape() {
        let source = CanonicalTrack::new("Song", vec!["Artist".to_string()]);
        let mut report = BatchReport::default();
        report.push(0, ResolutionOutcome::accepted(source, candidate(MatchConfidence::High), vec![]));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["matched"][0]["match"]["method"], "METADATA");
        assert_eq!(json["matched"][0]["match"]["confidence"], "high");
        assert_eq!(json["matched"][0]["status"], "matched");
    }

    #[test]
    fn test_match_rate_empty() {
        assert_eq!(BatchReport::default().match_rate(), 0.0);
    }
}
