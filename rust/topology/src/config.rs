// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topology and engine configuration.

use serde::{Deserialize, Serialize};

/// One row of the `topologies` relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub name: String,
    pub srid: i32,
    /// Snapping distance; zero selects a magnitude-based minimal tolerance.
    pub tolerance: f64,
    pub has_z: bool,
    pub next_edge_id: i64,
}

/// Engine-wide settings, loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lines with more points than this are cut before insertion.
    /// `None` inserts every line whole.
    pub line_max_points: Option<usize>,
    /// Polygon rings with more points than this are decomposed.
    pub ring_max_points: Option<usize>,
    /// Cap on inner edges confirmed per decomposed ring.
    pub max_inner_edges: usize,
    /// Capacity of each connection's prepared statement cache.
    pub statement_cache_capacity: usize,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            line_max_points: env_threshold("TOPO_LINE_MAX_POINTS"),
            ring_max_points: env_threshold("TOPO_RING_MAX_POINTS"),
            max_inner_edges: std::env::var("TOPO_MAX_INNER_EDGES")
                .unwrap_or_else(|_| "8".into())
                .parse()
                .unwrap_or(8),
            statement_cache_capacity: std::env::var("TOPO_STATEMENT_CACHE")
                .unwrap_or_else(|_| "64".into())
                .parse()
                .unwrap_or(64),
        }
    }

    /// Same settings with a line/ring point threshold applied to both.
    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.line_max_points = Some(max_points);
        self.ring_max_points = Some(max_points);
        self
    }
}

/// Parses a point-count threshold; values below 2 disable splitting.
fn env_threshold(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n >= 2)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            line_max_points: None,
            ring_max_points: None,
            max_inner_edges: 8,
            statement_cache_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_do_not_split() {
        let config = EngineConfig::default();
        assert_eq!(config.line_max_points, None);
        assert_eq!(config.max_inner_edges, 8);
        let config = config.with_max_points(100);
        assert_eq!(config.ring_max_points, Some(100));
    }

    #[test]
    fn threshold_below_two_is_ignored() {
        std::env::set_var("TOPO_TEST_THRESHOLD_ONE", "1");
        assert_eq!(env_threshold("TOPO_TEST_THRESHOLD_ONE"), None);
        std::env::set_var("TOPO_TEST_THRESHOLD_OK", " 250 ");
        assert_eq!(env_threshold("TOPO_TEST_THRESHOLD_OK"), Some(250));
    }
}
