//! Recognized configuration options (spec §6).

use std::collections::HashSet;

/// Engine-wide configuration. All fields have sane defaults; callers
/// typically only override `keycache_capacity` in tests that want to
/// exercise LRU eviction deterministically.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on the number of entries kept in the keycache and in the
    /// attribute cache's `shallowest` hint cache (spec C4/C5). Must be
    /// positive.
    pub keycache_capacity: usize,
    /// Graph names rejected on creation.
    pub illegal_graph_names: HashSet<String>,
    /// Node names rejected on creation.
    pub illegal_node_names: HashSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            keycache_capacity: 1024,
            illegal_graph_names: ["global"].into_iter().map(String::from).collect(),
            illegal_node_names: ["nodes", "node_val", "edges", "edge_val"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl EngineConfig {
    /// Panics on construction of an engine if `keycache_capacity` is zero;
    /// this is checked explicitly rather than silently clamped, since a
    /// capacity of zero would make the keycache unable to cache anything,
    /// which almost always indicates a caller mistake.
    pub fn validate(&self) -> Result<(), String> {
        if self.keycache_capacity == 0 {
            return Err("keycache_capacity must be positive".to_string());
        }
        Ok(())
    }

    pub fn is_illegal_graph_name(&self, name: &str) -> bool {
        self.illegal_graph_names.contains(name)
    }

    pub fn is_illegal_node_name(&self, name: &str) -> bool {
        self.illegal_node_names.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rejects_global_graph_name() {
        let cfg = EngineConfig::default();
        assert!(cfg.is_illegal_graph_name("global"));
        assert!(!cfg.is_illegal_graph_name("social"));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.keycache_capacity = 0;
        assert!(cfg.validate().is_err());
    }
}
