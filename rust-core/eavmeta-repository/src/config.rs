// SPDX-License-Identifier: PMPL-1.0-or-later
//! Repository configuration.
//!
//! Defaults:
//! - local_collection_id: "local"
//! - local_collection_name: none
//! - commit_timeout_ms: 30000
//! - query: see [`QueryConfig`]
//! - error_cache: see [`ErrorCacheConfig`]

use eavmeta_model::{ErrorKind, RepositoryError};
use eavmeta_mutation::{CollectionContext, ErrorCacheConfig};
use eavmeta_query::QueryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for RepositoryError {
    fn from(err: ConfigError) -> Self {
        RepositoryError::new(ErrorKind::InvalidParameter, err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Home collection of everything this repository creates.
    pub local_collection_id: String,
    pub local_collection_name: Option<String>,
    /// How long a mutation waits for its transaction outcome.
    pub commit_timeout_ms: u64,
    pub query: QueryConfig,
    pub error_cache: ErrorCacheConfig,
}

impl RepositoryConfig {
    /// Parse and validate a JSON configuration. Missing fields take their
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_collection_id.trim().is_empty() {
            return Err(ConfigError::Invalid("local_collection_id must not be empty".into()));
        }
        if self.commit_timeout_ms == 0 {
            return Err(ConfigError::Invalid("commit_timeout_ms must be positive".into()));
        }
        if self.query.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid("query.query_timeout_ms must be positive".into()));
        }
        if self.query.max_traversal_depth == 0 {
            return Err(ConfigError::Invalid("query.max_traversal_depth must be positive".into()));
        }
        if self.query.max_page_size == 0 {
            return Err(ConfigError::Invalid("query.max_page_size must be positive".into()));
        }
        if self.error_cache.max_entries == 0 {
            return Err(ConfigError::Invalid("error_cache.max_entries must be positive".into()));
        }
        // An entry must survive at least as long as its caller waits.
        if self.error_cache.ttl_ms < self.commit_timeout_ms {
            return Err(ConfigError::Invalid(format!(
                "error_cache.ttl_ms ({}) is shorter than commit_timeout_ms ({})",
                self.error_cache.ttl_ms, self.commit_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    pub fn collection(&self) -> CollectionContext {
        CollectionContext::new(self.local_collection_id.clone(), self.local_collection_name.clone())
    }

    pub fn with_collection(mut self, id: impl Into<String>, name: Option<String>) -> Self {
        self.local_collection_id = id.into();
        self.local_collection_name = name;
        self
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            local_collection_id: "local".to_string(),
            local_collection_name: None,
            commit_timeout_ms: 30_000,
            query: QueryConfig::default(),
            error_cache: ErrorCacheConfig::default(),
        }
    }
}
