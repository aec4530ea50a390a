//! Raw catalog record shapes and their conversion to [`CanonicalTrack`].
//!
//! Each source catalog gets its own explicitly typed record and one
//! conversion function. All fields are optional on the wire; conversion never
//! fails and fills documented defaults instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::CanonicalTrack;
use crate::normalize::{dedupe_artists, parse_artists};

// ============================================================================
// Source Formats
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CatalogFormat {
    AppleMusic,
    Spotify,
    Export,
}

impl CatalogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            CatalogFormat::AppleMusic => "apple-music",
            CatalogFormat::Spotify => "spotify",
            CatalogFormat::Export => "export",
        }
    }
}

impl fmt::Display for CatalogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CatalogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "apple-music" | "apple_music" | "apple" => Ok(CatalogFormat::AppleMusic),
            "spotify" => Ok(CatalogFormat::Spotify),
            "export" | "flat" => Ok(CatalogFormat::Export),
            other => Err(format!(
                "unknown catalog format '{}' (expected apple-music, spotify or export)",
                other
            )),
        }
    }
}

// ============================================================================
// Apple Music
// ============================================================================

/// Apple Music catalog song resource (`/v1/catalog/{storefront}/songs`).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppleMusicSong {
    pub id: Option<String>,
    pub attributes: AppleMusicAttributes,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppleMusicAttributes {
    pub name: Option<String>,
    pub artist_name: Option<String>, // Single credit string, e.g. "A & B feat. C"
    pub album_name: Option<String>,
    pub duration_in_millis: Option<u64>,
    pub isrc: Option<String>,
    pub content_rating: Option<String>, // "explicit" | "clean" | absent
}

// ============================================================================
// Spotify
// ============================================================================

/// Spotify Web API track object.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SpotifyTrack {
    pub id: Option<String>,
    pub name: Option<String>,
    pub artists: Vec<SpotifyArtist>,
    pub album: Option<SpotifyAlbum>,
    pub duration_ms: Option<u64>,
    pub explicit: bool,
    pub external_ids: Option<SpotifyExternalIds>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SpotifyArtist {
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SpotifyAlbum {
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SpotifyExternalIds {
    pub isrc: Option<String>,
}

// ============================================================================
// Flat Playlist Export
// ============================================================================

/// Flat record as written by playlist export tools (one object per row).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExportedTrack {
    pub id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>, // Credit string, parsed like Apple's
    pub album: Option<String>,
    pub duration_ms: Option<u64>,
    pub isrc: Option<String>,
    pub explicit: Option<bool>,
}

// ============================================================================
// Tagged Union
// ============================================================================

/// A raw record tagged with the catalog shape it came from.
#[derive(Clone, Debug)]
pub enum RawTrack {
    AppleMusic(AppleMusicSong),
    Spotify(SpotifyTrack),
    Export(ExportedTrack),
}

impl RawTrack {
    pub fn format(&self) -> CatalogFormat {
        match self {
            RawTrack::AppleMusic(_) => CatalogFormat::AppleMusic,
            RawTrack::Spotify(_) => CatalogFormat::Spotify,
            RawTrack::Export(_) => CatalogFormat::Export,
        }
    }

    /// Decode a JSON value as the given format.
    /// Only non-object values fail; missing fields take defaults.
    pub fn from_value(format: CatalogFormat, value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match format {
            CatalogFormat::AppleMusic => RawTrack::AppleMusic(serde_json::from_value(value)?),
            CatalogFormat::Spotify => RawTrack::Spotify(serde_json::from_value(value)?),
            CatalogFormat::Export => RawTrack::Export(serde_json::from_value(value)?),
        })
    }
}

// ============================================================================
// Conversion
// ============================================================================

/// Convert any raw record to its canonical form.
pub fn to_canonical(raw: &RawTrack) -> CanonicalTrack {
    match raw {
        RawTrack::AppleMusic(song) => apple_music_to_canonical(song),
        RawTrack::Spotify(track) => spotify_to_canonical(track),
        RawTrack::Export(track) => export_to_canonical(track),
    }
}

/// Decode a JSON array of raw records and convert each one.
pub fn parse_canonical_tracks(
    format: CatalogFormat,
    json: &str,
) -> serde_json::Result<Vec<CanonicalTrack>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
    values
        .into_iter()
        .map(|v| RawTrack::from_value(format, v).map(|raw| to_canonical(&raw)))
        .collect()
}

pub fn apple_music_to_canonical(song: &AppleMusicSong) -> CanonicalTrack {
    let attrs = &song.attributes;
    CanonicalTrack {
        id: clean_optional(song.id.as_deref()),
        name: clean_text(attrs.name.as_deref()),
        artists: attrs
            .artist_name
            .as_deref()
            .map(parse_artists)
            .unwrap_or_default(),
        album_name: clean_optional(attrs.album_name.as_deref()),
        duration_ms: attrs.duration_in_millis.unwrap_or(0),
        isrc: clean_isrc(attrs.isrc.as_deref()),
        explicit: attrs
            .content_rating
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("explicit")),
    }
}

pub fn spotify_to_canonical(track: &SpotifyTrack) -> CanonicalTrack {
    CanonicalTrack {
        id: clean_optional(track.id.as_deref()),
        name: clean_text(track.name.as_deref()),
        artists: dedupe_artists(track.artists.iter().filter_map(|a| a.name.clone())),
        album_name: track
            .album
            .as_ref()
            .and_then(|a| clean_optional(a.name.as_deref())),
        duration_ms: track.duration_ms.unwrap_or(0),
        isrc: track
            .external_ids
            .as_ref()
            .and_then(|ids| clean_isrc(ids.isrc.as_deref())),
        explicit: track.explicit,
    }
}

pub fn export_to_canonical(track: &ExportedTrack) -> CanonicalTrack {
    CanonicalTrack {
        id: clean_optional(track.id.as_deref()),
        name: clean_text(track.title.as_deref()),
        artists: track.artist.as_deref().map(parse_artists).unwrap_or_default(),
        album_name: clean_optional(track.album.as_deref()),
        duration_ms: track.duration_ms.unwrap_or(0),
        isrc: clean_isrc(track.isrc.as_deref()),
        explicit: track.explicit.unwrap_or(false),
    }
}

fn clean_text(s: Option<&str>) -> String {
    s.map(|v| v.trim().to_string()).unwrap_or_default()
}

fn clean_optional(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// ISRCs compare case-insensitively; store them trimmed and upper-cased.
pub fn clean_isrc(s: Option<&str>) -> Option<String> {
    clean_optional(s).map(|v| v.to_ascii_uppercase())
}
