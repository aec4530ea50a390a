//! Cross-catalog track resolution - shared modules for all binaries.

pub mod batch;
pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod records;
pub mod resolver;
pub mod safety;
pub mod scoring;

#[cfg(test)]
mod test_support;

pub use batch::{resolve_batch, BatchHooks, StopSignal};
pub use catalog::{CatalogCapability, SqliteCatalog};
pub use config::MatchConfig;
pub use error::{BatchError, ConfigError, LoggingError, LookupError, ResolveError};
pub use models::{BatchReport, CanonicalTrack, MatchCandidate, ResolutionOutcome};
pub use resolver::Resolver;
