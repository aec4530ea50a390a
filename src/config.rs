//! Matching parameters.
//!
//! Thresholds and cutoffs are product-tuned values, so they live here rather
//! than as constants in the resolver. Every field has a default; a JSON file
//! may override any subset of them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_STOREFRONT: &str = "us";

/// Minimum metadata score to accept a match
pub const DEFAULT_ACCEPT_THRESHOLD: u32 = 80;

/// Metadata score at or above which a match is high confidence
pub const DEFAULT_HIGH_CONFIDENCE_THRESHOLD: u32 = 90;

pub const DEFAULT_ISRC_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 1_500;
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const DEFAULT_MAX_ISRC_ALTERNATIVES: usize = 5;
pub const DEFAULT_MAX_METADATA_ALTERNATIVES: usize = 4;

/// Upper bound on the worker pool
pub const MAX_CONCURRENCY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub storefront: String,
    pub accept_threshold: u32,
    pub high_confidence_threshold: u32,
    pub isrc_timeout_ms: u64,
    pub search_timeout_ms: u64,
    pub search_limit: usize,
    pub max_isrc_alternatives: usize,
    pub max_metadata_alternatives: usize,
    /// 1 = sequential (default)
    pub concurrency: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            storefront: DEFAULT_STOREFRONT.to_string(),
            accept_threshold: DEFAULT_ACCEPT_THRESHOLD,
            high_confidence_threshold: DEFAULT_HIGH_CONFIDENCE_THRESHOLD,
            isrc_timeout_ms: DEFAULT_ISRC_TIMEOUT_MS,
            search_timeout_ms: DEFAULT_SEARCH_TIMEOUT_MS,
            search_limit: DEFAULT_SEARCH_LIMIT,
            max_isrc_alternatives: DEFAULT_MAX_ISRC_ALTERNATIVES,
            max_metadata_alternatives: DEFAULT_MAX_METADATA_ALTERNATIVES,
            concurrency: 1,
        }
    }
}

impl MatchConfig {
    /// Load from a JSON file; absent keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: MatchConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storefront.trim().is_empty() {
            return Err(ConfigError::Invalid("storefront must not be empty".into()));
        }
        if self.high_confidence_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "high_confidence_threshold {} exceeds 100",
                self.high_confidence_threshold
            )));
        }
        if self.accept_threshold > self.high_confidence_threshold {
            return Err(ConfigError::Invalid(format!(
                "accept_threshold {} is above high_confidence_threshold {}",
                self.accept_threshold, self.high_confidence_threshold
            )));
        }
        if self.isrc_timeout_ms == 0 || self.search_timeout_ms == 0 {
            return Err(ConfigError::Invalid("lookup timeouts must be positive".into()));
        }
        if self.search_limit == 0 {
            return Err(ConfigError::Invalid("search_limit must be at least 1".into()));
        }
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Invalid(format!(
                "concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY, self.concurrency
            )));
        }
        Ok(())
    }

    pub fn isrc_timeout(&self) -> Duration {
        Duration::from_millis(self.isrc_timeout_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }
}
