//! Candidate resolution for a single source track.
//!
//! Two tiers, short-circuiting:
//! 1. ISRC lookup, when the source carries one. Authoritative: any hit is
//!    accepted with high confidence.
//! 2. Metadata search on "title primary-artist", every result scored with the
//!    composite score; the best one is accepted at or above the threshold.
//!
//! A failed catalog call is reported to the diagnostics sink and the
//! resolver moves on to the next tier. Nothing is retried in place.

use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::CatalogCapability;
use crate::config::MatchConfig;
use crate::diagnostics::{default_diagnostics, Diagnostics};
use crate::error::ResolveError;
use crate::models::{
    CanonicalTrack, MatchCandidate, MatchConfidence, MatchMethod, ResolutionOutcome,
};
use crate::scoring::{albums_match, composite_score, confidence_for_score, MAX_SCORE};

pub struct Resolver<C> {
    catalog: C,
    config: MatchConfig,
    diagnostics: Arc<dyn Diagnostics>,
}

impl<C: CatalogCapability> Resolver<C> {
    /// Resolver reporting through `tracing`.
    pub fn new(catalog: C, config: MatchConfig) -> Self {
        Self {
            catalog,
            config,
            diagnostics: default_diagnostics(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &dyn Diagnostics {
        self.diagnostics.as_ref()
    }

    /// Resolve one source track against the target catalog.
    ///
    /// Returns `Err` only for tracks that cannot be resolved at all; lookup
    /// failures degrade to the next tier or to an unavailable outcome.
    pub fn resolve(&self, source: &CanonicalTrack) -> Result<ResolutionOutcome, ResolveError> {
        let started = Instant::now();
        let isrc = source
            .isrc
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        if source.name.trim().is_empty() && isrc.is_none() {
            return Err(ResolveError::MalformedTrack(
                "track has neither a name nor an ISRC".to_string(),
            ));
        }

        if let Some(isrc) = isrc {
            if let Some(outcome) = self.resolve_by_isrc(source, isrc, started) {
                return Ok(outcome);
            }
        }

        if let Some(outcome) = self.resolve_by_metadata(source, started) {
            return Ok(outcome);
        }

        self.diagnostics
            .info(&format!("no match for '{}'", source.display_label()));
        Ok(ResolutionOutcome::unavailable(source.clone()))
    }

    // ========================================================================
    // ISRC tier
    // ========================================================================

    fn resolve_by_isrc(
        &self,
        source: &CanonicalTrack,
        isrc: &str,
        started: Instant,
    ) -> Option<ResolutionOutcome> {
        let mut results = match self.catalog.lookup_by_isrc(
            isrc,
            &self.config.storefront,
            self.config.isrc_timeout(),
        ) {
            Ok(results) => results,
            Err(e) => {
                self.diagnostics.warn(&format!(
                    "ISRC lookup failed for '{}' ({}): {}",
                    source.display_label(),
                    isrc,
                    e
                ));
                return None;
            }
        };
        if results.is_empty() {
            return None;
        }

        // Same recording can sit on several releases; prefer the source's album
        let album_hit = results.iter().position(|candidate| {
            albums_match(candidate.album_name.as_deref(), source.album_name.as_deref())
        });
        let primary_track = results.remove(album_hit.unwrap_or(0));
        let match_time_ms = elapsed_ms(started);

        let score = if album_hit.is_some() {
            MAX_SCORE
        } else {
            composite_score(source, &primary_track)
        };
        let primary = MatchCandidate {
            track: primary_track,
            method: MatchMethod::Isrc,
            confidence: MatchConfidence::High,
            score,
            match_time_ms,
        };

        let alternatives = results
            .into_iter()
            .map(|track| MatchCandidate {
                score: composite_score(source, &track),
                track,
                method: MatchMethod::Isrc,
                confidence: MatchConfidence::High,
                match_time_ms,
            })
            .collect();
        let alternatives = dedupe_alternatives(
            &primary,
            alternatives,
            self.config.max_isrc_alternatives,
        );

        Some(ResolutionOutcome::accepted(source.clone(), primary, alternatives))
    }

    // ========================================================================
    // Metadata tier
    // ========================================================================

    fn resolve_by_metadata(
        &self,
        source: &CanonicalTrack,
        started: Instant,
    ) -> Option<ResolutionOutcome> {
        let term = search_term(source)?;
        let results = match self.catalog.search_by_text(
            &term,
            &self.config.storefront,
            self.config.search_limit,
            self.config.search_timeout(),
        ) {
            Ok(results) => results,
            Err(e) => {
                self.diagnostics.warn(&format!(
                    "metadata search failed for '{}': {}",
                    source.display_label(),
                    e
                ));
                return None;
            }
        };

        let mut scored: Vec<(u32, CanonicalTrack)> = results
            .into_iter()
            .map(|track| (composite_score(source, &track), track))
            .collect();
        // Stable: ties keep the catalog's relevance order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let match_time_ms = elapsed_ms(started);
        let mut ranked = scored.into_iter().map(|(score, track)| MatchCandidate {
            confidence: confidence_for_score(score, &self.config),
            track,
            method: MatchMethod::Metadata,
            score,
            match_time_ms,
        });

        let primary = ranked.next()?;
        if primary.score < self.config.accept_threshold {
            self.diagnostics.info(&format!(
                "best metadata candidate for '{}' scored {} (threshold {})",
                source.display_label(),
                primary.score,
                self.config.accept_threshold
            ));
            return None;
        }

        let alternatives = dedupe_alternatives(
            &primary,
            ranked.collect(),
            self.config.max_metadata_alternatives,
        );
        Some(ResolutionOutcome::accepted(source.clone(), primary, alternatives))
    }
}

/// Search term for the metadata tier: title plus primary artist.
/// None when the source has no title to search for.
pub fn search_term(source: &CanonicalTrack) -> Option<String> {
    let name = source.name.trim();
    if name.is_empty() {
        return None;
    }
    Some(match source.primary_artist().map(str::trim) {
        Some(artist) if !artist.is_empty() => format!("{} {}", name, artist),
        _ => name.to_string(),
    })
}

/// Drop alternatives that repeat the primary (or an earlier alternative) by
/// catalog id, then cap. Candidates without an id are always kept.
fn dedupe_alternatives(
    primary: &MatchCandidate,
    alternatives: Vec<MatchCandidate>,
    cap: usize,
) -> Vec<MatchCandidate> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    if let Some(id) = &primary.track.id {
        seen.insert(id.clone());
    }
    alternatives
        .into_iter()
        .filter(|candidate| match &candidate.track.id {
            Some(id) => seen.insert(id.clone()),
            None => true,
        })
        .take(cap)
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
