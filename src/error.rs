//! Error types for each failure scope.
//!
//! Lookup failures stay inside a resolver tier, resolution failures are
//! recorded per track, and only batch failures reach the batch's caller.

use thiserror::Error;

/// Failure of a single catalog call. Absorbed by the resolver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("lookup timed out after {elapsed_ms}ms (budget {budget_ms}ms)")]
    Timeout { elapsed_ms: u64, budget_ms: u64 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for LookupError {
    fn from(e: rusqlite::Error) -> Self {
        LookupError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for LookupError {
    fn from(e: serde_json::Error) -> Self {
        LookupError::Parse(e.to_string())
    }
}

/// Failure outside the expected lookup path for one track.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("malformed source track: {0}")]
    MalformedTrack(String),
    #[error("resolution panicked: {0}")]
    Panicked(String),
}

/// Defect in the batch setup itself. Fatal for the whole batch.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("invalid match config: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("target catalog unusable: {0}")]
    Capability(LookupError),
    #[error("worker pool: {0}")]
    Pool(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

/// Global subscriber setup failure.
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}
