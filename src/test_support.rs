//! Test doubles shared by the resolver and batch tests.

use std::sync::Mutex;
use std::time::Duration;

use crate::catalog::CatalogCapability;
use crate::diagnostics::Diagnostics;
use crate::error::LookupError;
use crate::models::CanonicalTrack;

type Responder = Box<dyn Fn(&str) -> Result<Vec<CanonicalTrack>, LookupError> + Send + Sync>;

/// Scripted catalog. Each call is recorded as "isrc:<code>" or "search:<term>".
pub struct MockCatalog {
    isrc: Responder,
    search: Responder,
    check: Option<LookupError>,
    pub calls: Mutex<Vec<String>>,
}

impl MockCatalog {
    /// Catalog that finds nothing.
    pub fn empty() -> Self {
        Self {
            isrc: Box::new(|_| Ok(Vec::new())),
            search: Box::new(|_| Ok(Vec::new())),
            check: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_isrc<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<CanonicalTrack>, LookupError> + Send + Sync + 'static,
    {
        self.isrc = Box::new(f);
        self
    }

    pub fn on_search<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<CanonicalTrack>, LookupError> + Send + Sync + 'static,
    {
        self.search = Box::new(f);
        self
    }

    pub fn failing_check(mut self, error: LookupError) -> Self {
        self.check = Some(error);
        self
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CatalogCapability for MockCatalog {
    fn lookup_by_isrc(
        &self,
        isrc: &str,
        _storefront: &str,
        _timeout: Duration,
    ) -> Result<Vec<CanonicalTrack>, LookupError> {
        self.calls.lock().unwrap().push(format!("isrc:{}", isrc));
        (self.isrc)(isrc)
    }

    fn search_by_text(
        &self,
        term: &str,
        _storefront: &str,
        limit: usize,
        _timeout: Duration,
    ) -> Result<Vec<CanonicalTrack>, LookupError> {
        self.calls.lock().unwrap().push(format!("search:{}", term));
        (self.search)(term).map(|mut found| {
            found.truncate(limit);
            found
        })
    }

    fn check(&self) -> Result<(), LookupError> {
        match &self.check {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// Diagnostics sink that keeps every message, prefixed with its level.
#[derive(Default)]
pub struct RecordingDiagnostics {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingDiagnostics {
    pub fn lines(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self, level: &str) -> usize {
        let prefix = format!("{}:", level);
        self.lines().iter().filter(|l| l.starts_with(&prefix)).count()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn info(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("info: {}", message));
    }

    fn warn(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("warn: {}", message));
    }

    fn error(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("error: {}", message));
    }
}

/// Shorthand for a single-artist track.
pub fn track(name: &str, artist: &str) -> CanonicalTrack {
    CanonicalTrack::new(name, vec![artist.to_string()])
}
