//! The retrieval result shape (spec §3: `ContextAssembly`).

use serde::{Deserialize, Serialize};
use stat7_anchor::AnchorId;
use std::collections::BTreeMap;

/// One ranked entry in a [`ContextAssembly`] (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorResult {
    pub anchor_id: AnchorId,
    pub relevance_score: f64,
    pub temporal_distance: i64,
    pub anchor_connections: Vec<AnchorId>,
    pub provenance_depth: u64,
    pub conflict_flags: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Aggregate metadata returned alongside the ranked results (spec §3/§4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    pub total_scanned: usize,
    pub cache_hit: bool,
    pub elapsed_ms: f64,
    pub degraded: bool,
    /// Set to `"no_results_above_threshold"` when the query produced no
    /// qualifying anchors (spec §4.5 failure semantics) rather than an
    /// error.
    pub reason: Option<String>,
}

/// `ContextAssembly` (spec §3): the ordered, ranked bundle returned from a
/// retrieval query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextAssembly {
    pub results: Vec<AnchorResult>,
    pub aggregate: AssemblyMetadata,
}

impl ContextAssembly {
    pub fn empty_no_results(total_scanned: usize, elapsed_ms: f64) -> Self {
        ContextAssembly {
            results: Vec::new(),
            aggregate: AssemblyMetadata {
                total_scanned,
                cache_hit: false,
                elapsed_ms,
                degraded: false,
                reason: Some("no_results_above_threshold".to_string()),
            },
        }
    }
}
