//! Target-catalog access.
//!
//! [`CatalogCapability`] is the only boundary the resolver talks to. The
//! collaborator behind it owns transport, credentials and rate limits; the
//! resolver only passes a per-call time budget.
//!
//! [`SqliteCatalog`] implements the capability over a local snapshot of a
//! catalog: a `tracks` table plus an FTS5 index over normalized text.

use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::LookupError;
use crate::models::CanonicalTrack;
use crate::normalize::normalize_for_comparison;
use crate::records::clean_isrc;

// ============================================================================
// Capability Trait
// ============================================================================

/// Lookup and search operations against a target catalog.
///
/// Implementations must return within roughly `timeout`; the resolver treats
/// any error as a tier-local failure and moves on.
pub trait CatalogCapability: Send + Sync {
    fn lookup_by_isrc(
        &self,
        isrc: &str,
        storefront: &str,
        timeout: Duration,
    ) -> Result<Vec<CanonicalTrack>, LookupError>;

    fn search_by_text(
        &self,
        term: &str,
        storefront: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<CanonicalTrack>, LookupError>;

    /// Sanity check run once before a batch. An error here is fatal for the batch.
    fn check(&self) -> Result<(), LookupError> {
        Ok(())
    }
}

impl<T: CatalogCapability + ?Sized> CatalogCapability for &T {
    fn lookup_by_isrc(
        &self,
        isrc: &str,
        storefront: &str,
        timeout: Duration,
    ) -> Result<Vec<CanonicalTrack>, LookupError> {
        (**self).lookup_by_isrc(isrc, storefront, timeout)
    }

    fn search_by_text(
        &self,
        term: &str,
        storefront: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<CanonicalTrack>, LookupError> {
        (**self).search_by_text(term, storefront, limit, timeout)
    }

    fn check(&self) -> Result<(), LookupError> {
        (**self).check()
    }
}

impl<T: CatalogCapability + ?Sized> CatalogCapability for Box<T> {
    fn lookup_by_isrc(
        &self,
        isrc: &str,
        storefront: &str,
        timeout: Duration,
    ) -> Result<Vec<CanonicalTrack>, LookupError> {
        (**self).lookup_by_isrc(isrc, storefront, timeout)
    }

    fn search_by_text(
        &self,
        term: &str,
        storefront: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<CanonicalTrack>, LookupError> {
        (**self).search_by_text(term, storefront, limit, timeout)
    }

    fn check(&self) -> Result<(), LookupError> {
        (**self).check()
    }
}

impl<T: CatalogCapability + ?Sized> CatalogCapability for Arc<T> {
    fn lookup_by_isrc(
        &self,
        isrc: &str,
        storefront: &str,
        timeout: Duration,
    ) -> Result<Vec<CanonicalTrack>, LookupError> {
        (**self).lookup_by_isrc(isrc, storefront, timeout)
    }

    fn search_by_text(
        &self,
        term: &str,
        storefront: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<CanonicalTrack>, LookupError> {
        (**self).search_by_text(term, storefront, limit, timeout)
    }

    fn check(&self) -> Result<(), LookupError> {
        (**self).check()
    }
}

// ============================================================================
// SQLite Snapshot Catalog
// ============================================================================

/// Rows per write transaction during import.
pub const WRITE_BATCH_SIZE: usize = 10_000;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tracks (
        id INTEGER PRIMARY KEY,
        catalog_id TEXT,
        storefront TEXT NOT NULL,
        name TEXT NOT NULL,
        artists_json TEXT NOT NULL,
        album_name TEXT,
        duration_ms INTEGER NOT NULL,
        isrc TEXT,
        explicit INTEGER NOT NULL,
        name_norm TEXT NOT NULL,
        artist_norm TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_tracks_isrc ON tracks(isrc, storefront);

    CREATE VIRTUAL TABLE IF NOT EXISTS tracks_fts USING fts5(
        name_norm, artist_norm,
        content='tracks',
        content_rowid='id',
        tokenize='unicode61 remove_diacritics 2'
    );";

const SELECT_COLUMNS: &str =
    "t.catalog_id, t.name, t.artists_json, t.album_name, t.duration_ms, t.isrc, t.explicit";

/// Ops between deadline checks while a statement runs.
const DEADLINE_CHECK_OPS: i32 = 1_000;

static MEMORY_DB_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Catalog snapshot stored in SQLite.
///
/// Connections are pooled: each concurrent caller takes its own connection
/// and hands it back when done, opening a new one when none is idle.
pub struct SqliteCatalog {
    target: String,
    flags: OpenFlags,
    idle: Mutex<Vec<Connection>>,
    /// Holds a shared in-memory database open while pooled connections come and go
    _anchor: Option<Mutex<Connection>>,
}

impl SqliteCatalog {
    /// Open an existing snapshot read-only.
    pub fn open(path: &Path) -> Result<Self, LookupError> {
        let catalog = Self::new(
            path.to_string_lossy().into_owned(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        );
        let conn = catalog.connect()?;
        catalog.checkin(conn);
        Ok(catalog)
    }

    /// Create (or reopen for writing) a snapshot and ensure the schema exists.
    pub fn create(path: &Path) -> Result<Self, LookupError> {
        let catalog = Self::new(path.to_string_lossy().into_owned(), OpenFlags::default());
        catalog.with_connection(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;",
            )?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })?;
        Ok(catalog)
    }

    /// Private in-memory snapshot. Pooled connections share it through a
    /// named shared-cache database that lives as long as the catalog.
    pub fn open_in_memory() -> Result<Self, LookupError> {
        let name = format!(
            "file:track-resolver-{}-{}?mode=memory&cache=shared",
            std::process::id(),
            MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let mut catalog = Self::new(name, OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI);
        let anchor = catalog.connect()?;
        anchor.execute_batch(SCHEMA)?;
        catalog._anchor = Some(Mutex::new(anchor));
        Ok(catalog)
    }

    /// In-memory snapshot holding `tracks`, search index built.
    pub fn from_tracks(storefront: &str, tracks: &[CanonicalTrack]) -> Result<Self, LookupError> {
        let catalog = Self::open_in_memory()?;
        catalog.insert_tracks(storefront, tracks, |_| {})?;
        catalog.rebuild_search_index()?;
        Ok(catalog)
    }

    fn new(target: String, flags: OpenFlags) -> Self {
        Self {
            target,
            flags,
            idle: Mutex::new(Vec::new()),
            _anchor: None,
        }
    }

    fn connect(&self) -> Result<Connection, LookupError> {
        let conn = Connection::open_with_flags(&self.target, self.flags)?;
        conn.execute_batch("PRAGMA cache_size = -64000;")?;
        if self.flags.contains(OpenFlags::SQLITE_OPEN_READ_ONLY) {
            conn.execute_batch("PRAGMA mmap_size = 268435456;")?;
        }
        Ok(conn)
    }

    /// Take an idle connection, or open another one.
    fn checkout(&self) -> Result<Connection, LookupError> {
        let reused = self.idle()?.pop();
        match reused {
            Some(conn) => Ok(conn),
            None => self.connect(),
        }
    }

    fn checkin(&self, conn: Connection) {
        if let Ok(mut idle) = self.idle() {
            idle.push(conn);
        }
    }

    fn idle(&self) -> Result<MutexGuard<'_, Vec<Connection>>, LookupError> {
        self.idle
            .lock()
            .map_err(|_| LookupError::Storage("catalog connection pool poisoned".to_string()))
    }

    /// Run `f` on a pooled connection. A connection whose call failed is
    /// still returned to the pool.
    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, LookupError>,
    ) -> Result<T, LookupError> {
        let mut conn = self.checkout()?;
        let result = f(&mut conn);
        self.checkin(conn);
        result
    }

    /// Insert tracks in batched transactions. `on_inserted` receives the
    /// number of rows written after each batch.
    pub fn insert_tracks(
        &self,
        storefront: &str,
        tracks: &[CanonicalTrack],
        mut on_inserted: impl FnMut(usize),
    ) -> Result<usize, LookupError> {
        self.with_connection(|conn| {
            let mut written = 0;

            for chunk in tracks.chunks(WRITE_BATCH_SIZE) {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO tracks (catalog_id, storefront, name, artists_json, album_name,
                                             duration_ms, isrc, explicit, name_norm, artist_norm)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    )?;

                    for track in chunk {
                        let artists_json = serde_json::to_string(&track.artists)?;
                        let artist_norm = normalize_for_comparison(&track.artists.join(" "));
                        stmt.execute(params![
                            track.id,
                            storefront,
                            track.name,
                            artists_json,
                            track.album_name,
                            i64::try_from(track.duration_ms).unwrap_or(i64::MAX),
                            clean_isrc(track.isrc.as_deref()),
                            track.explicit,
                            normalize_for_comparison(&track.name),
                            artist_norm,
                        ])?;
                    }
                }
                tx.commit()?;
                written += chunk.len();
                on_inserted(chunk.len());
            }

            Ok(written)
        })
    }

    /// Rebuild the external-content FTS index from the `tracks` table.
    pub fn rebuild_search_index(&self) -> Result<(), LookupError> {
        self.with_connection(|conn| {
            conn.execute("INSERT INTO tracks_fts(tracks_fts) VALUES('rebuild')", [])?;
            Ok(())
        })
    }

    pub fn optimize(&self) -> Result<(), LookupError> {
        self.with_connection(|conn| {
            conn.execute_batch("VACUUM; ANALYZE;")?;
            Ok(())
        })
    }

    pub fn track_count(&self) -> Result<usize, LookupError> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    /// Run `f` on a pooled connection within `timeout`.
    ///
    /// The budget starts once a connection is in hand. A statement still
    /// running at the deadline is interrupted and reported as `Timeout`.
    fn timed<T>(
        &self,
        timeout: Duration,
        f: impl FnOnce(&Connection) -> Result<T, LookupError>,
    ) -> Result<T, LookupError> {
        self.with_connection(|conn| {
            conn.busy_timeout(timeout)?;

            let started = Instant::now();
            let deadline = started + timeout;
            let expired = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&expired);
            conn.progress_handler(
                DEADLINE_CHECK_OPS,
                Some(move || {
                    let over = Instant::now() >= deadline;
                    if over {
                        flag.store(true, Ordering::Relaxed);
                    }
                    over
                }),
            );

            let result = f(conn);
            conn.progress_handler(0, None::<fn() -> bool>);

            match result {
                Err(_) if expired.load(Ordering::Relaxed) => Err(LookupError::Timeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    budget_ms: timeout.as_millis() as u64,
                }),
                other => other,
            }
        })
    }
}

/// Raw row before the artists JSON is decoded.
struct TrackRow {
    catalog_id: Option<String>,
    name: String,
    artists_json: String,
    album_name: Option<String>,
    duration_ms: i64,
    isrc: Option<String>,
    explicit: bool,
}

impl TrackRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            catalog_id: row.get(0)?,
            name: row.get(1)?,
            artists_json: row.get(2)?,
            album_name: row.get(3)?,
            duration_ms: row.get(4)?,
            isrc: row.get(5)?,
            explicit: row.get(6)?,
        })
    }

    fn into_track(self) -> Result<CanonicalTrack, LookupError> {
        let artists: Vec<String> = serde_json::from_str(&self.artists_json)?;
        Ok(CanonicalTrack {
            id: self.catalog_id,
            name: self.name,
            artists,
            album_name: self.album_name,
            duration_ms: self.duration_ms.max(0) as u64,
            isrc: self.isrc,
            explicit: self.explicit,
        })
    }
}

fn collect_tracks(
    rows: impl Iterator<Item = rusqlite::Result<TrackRow>>,
) -> Result<Vec<CanonicalTrack>, LookupError> {
    rows.map(|row| row.map_err(LookupError::from).and_then(TrackRow::into_track))
        .collect()
}

/// Build an FTS5 query from a free-text term: normalized tokens, quoted,
/// OR-joined so partial matches still rank. None when nothing is searchable.
pub fn fts_query(term: &str) -> Option<String> {
    let normalized = normalize_for_comparison(term);
    let tokens: Vec<String> = normalized
        .split_whitespace()
        .map(|t| format!("\"{}\"", t))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

impl CatalogCapability for SqliteCatalog {
    fn lookup_by_isrc(
        &self,
        isrc: &str,
        storefront: &str,
        timeout: Duration,
    ) -> Result<Vec<CanonicalTrack>, LookupError> {
        let isrc = isrc.trim().to_ascii_uppercase();
        self.timed(timeout, |conn| {
            let sql = format!(
                "SELECT {} FROM tracks t WHERE t.isrc = ?1 AND t.storefront = ?2 ORDER BY t.id",
                SELECT_COLUMNS
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params![isrc, storefront], TrackRow::from_row)?;
            collect_tracks(rows)
        })
    }

    fn search_by_text(
        &self,
        term: &str,
        storefront: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<CanonicalTrack>, LookupError> {
        let Some(query) = fts_query(term) else {
            return Ok(Vec::new());
        };
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.timed(timeout, |conn| {
            let sql = format!(
                "SELECT {} FROM tracks_fts fts
                 JOIN tracks t ON fts.rowid = t.id
                 WHERE tracks_fts MATCH ?1 AND t.storefront = ?2
                 ORDER BY fts.rank
                 LIMIT ?3",
                SELECT_COLUMNS
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params![query, storefront, limit], TrackRow::from_row)?;
            collect_tracks(rows)
        })
    }

    fn check(&self) -> Result<(), LookupError> {
        let tables: i64 = self.with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('tracks', 'tracks_fts')",
                [],
                |row| row.get(0),
            )?)
        })?;
        if tables < 2 {
            return Err(LookupError::Storage(
                "catalog snapshot is missing the tracks table or its search index".to_string(),
            ));
        }
        Ok(())
    }
}
