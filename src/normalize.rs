//! Text normalization shared by record conversion, scoring and the catalog index.
//!
//! CRITICAL: the SQLite search index stores text normalized by these functions.
//! Any change here requires rebuilding catalog snapshots.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Multi-artist separators, applied successively in this order.
pub static ARTIST_SEPARATORS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\s+&\s+").unwrap(),
        Regex::new(r"(?i)\s+feat\.?\s+").unwrap(),
        Regex::new(r"(?i)\s+featuring\s+").unwrap(),
        Regex::new(r"(?i)\s+ft\.?\s+").unwrap(),
        Regex::new(r"(?i)\s+with\s+").unwrap(),
        Regex::new(r"(?i)\s+x\s+").unwrap(),
        Regex::new(r"\s+\+\s+").unwrap(),
        Regex::new(r",").unwrap(),
        Regex::new(r";").unwrap(),
    ]
});

/// Anything that is neither a word character nor whitespace.
pub static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());

pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritic).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{1AB0}'..='\u{1AFF}' |
             '\u{1DC0}'..='\u{1DFF}' | '\u{20D0}'..='\u{20FF}' |
             '\u{FE20}'..='\u{FE2F}')
}

/// Strip diacritics via NFD decomposition: "Beyoncé" → "Beyonce".
pub fn strip_diacritics(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a string for similarity comparison.
///
/// Lowercases, strips diacritics, turns punctuation into spaces and collapses
/// whitespace. Idempotent; empty input yields an empty string.
pub fn normalize_for_comparison(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let folded = strip_diacritics(&s.to_lowercase());
    let spaced = NON_WORD.replace_all(&folded, " ");
    MULTI_SPACE.replace_all(&spaced, " ").trim().to_string()
}

/// Split a multi-artist credit string into individual artist names.
///
/// Each separator re-splits the output of the previous one. Results are
/// trimmed, empties dropped and duplicates removed keeping first-seen order.
/// e.g., "A & B feat. C" → ["A", "B", "C"]
pub fn parse_artists(s: &str) -> Vec<String> {
    let mut parts: Vec<String> = vec![s.to_string()];
    for separator in ARTIST_SEPARATORS.iter() {
        parts = parts
            .iter()
            .flat_map(|part| separator.split(part).map(str::to_string).collect::<Vec<_>>())
            .collect();
    }
    dedupe_artists(parts)
}

/// Trim, drop empties and dedupe (case-sensitive) preserving order.
pub fn dedupe_artists<I>(artists: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen: FxHashSet<String> = FxHashSet::default();
    artists
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .filter(|a| seen.insert(a.clone()))
        .collect()
}

/// Normalized primary artist, empty when there is none.
pub fn normalize_primary_artist(artists: &[String]) -> String {
    artists
        .first()
        .map(|a| normalize_for_comparison(a))
        .unwrap_or_default()
}

// ============================================================================
// TESTS
// ============================================================================
