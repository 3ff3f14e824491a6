//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default bound on hierarchy traversal, in parent-edge hops.
pub const DEFAULT_MAX_HIERARCHY_DEPTH: usize = 64;

/// Tunables for a `PolicyEngine`.
///
/// Deserializable so hosts can embed it in their own configuration files;
/// every field has a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of parent hops a hierarchy traversal may take before
    /// it is aborted with `HierarchyTooDeep`.
    pub max_hierarchy_depth: usize,
    /// Report per-phase timings to the metrics sink on every evaluation.
    pub record_phase_metrics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_hierarchy_depth: DEFAULT_MAX_HIERARCHY_DEPTH,
            record_phase_metrics: false,
        }
    }
}

impl EngineConfig {
    pub fn with_max_hierarchy_depth(mut self, depth: usize) -> Self {
        self.max_hierarchy_depth = depth;
        self
    }

    pub fn with_phase_metrics(mut self, enabled: bool) -> Self {
        self.record_phase_metrics = enabled;
        self
    }
}
