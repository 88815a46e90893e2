// SPDX-License-Identifier: PMPL-1.0-or-later
//! Query configuration.
//!
//! Defaults:
//! - query_timeout_ms: 30000
//! - max_traversal_depth: 10
//! - max_page_size: 1000

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounds applied to every compiled search and graph query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Evaluation deadline of each store query, in milliseconds.
    pub query_timeout_ms: u64,
    /// Hop ceiling for graph traversal, whatever the caller requests.
    pub max_traversal_depth: u32,
    /// Largest page a search may return.
    pub max_page_size: usize,
}

impl QueryConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Depth actually traversed: the request clamped to the ceiling, with
    /// no request (or 0) meaning the ceiling itself.
    pub fn effective_depth(&self, requested: Option<u32>) -> u32 {
        match requested {
            None | Some(0) => self.max_traversal_depth,
            Some(depth) => depth.min(self.max_traversal_depth),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 30_000,
            max_traversal_depth: 10,
            max_page_size: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_depth() {
        let config = QueryConfig::default();
        assert_eq!(config.effective_depth(None), 10);
        assert_eq!(config.effective_depth(Some(0)), 10);
        assert_eq!(config.effective_depth(Some(2)), 2);
        assert_eq!(config.effective_depth(Some(500)), 10);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: QueryConfig = serde_json::from_str(r#"{"max_page_size": 50}"#).unwrap();
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.query_timeout_ms, 30_000);
    }
}
