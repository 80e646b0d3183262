//! The retrieval query (spec §3, C5).

use serde::{Deserialize, Serialize};
use stat7_anchor::AnchorId;
use stat7_core::canonical::{CanonicalValue, ToCanonical};
use stat7_core::{Horizon, Polarity, Realm, Timestamp};

/// The six query modes (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryMode {
    SemanticSimilarity,
    TemporalSequence,
    AnchorNeighborhood,
    ProvenanceChain,
    ConflictAware,
    Composite,
}

impl QueryMode {
    fn as_str(&self) -> &'static str {
        match self {
            QueryMode::SemanticSimilarity => "semantic_similarity",
            QueryMode::TemporalSequence => "temporal_sequence",
            QueryMode::AnchorNeighborhood => "anchor_neighborhood",
            QueryMode::ProvenanceChain => "provenance_chain",
            QueryMode::ConflictAware => "conflict_aware",
            QueryMode::Composite => "composite",
        }
    }
}

/// A partial STAT7 coordinate used as a filter (spec §3 `coord_filter?`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordFilter {
    pub realm: Option<Realm>,
    pub horizon: Option<Horizon>,
    pub polarity: Option<Polarity>,
}

impl CoordFilter {
    pub fn matches(&self, coord: &stat7_core::Coord) -> bool {
        self.realm.map(|r| r == coord.realm).unwrap_or(true)
            && self.horizon.map(|h| h == coord.horizon).unwrap_or(true)
            && self.polarity.map(|p| p == coord.polarity).unwrap_or(true)
    }
}

/// `{ query_id, mode, semantic_query?, coord_filter?, temporal_range?,
/// max_results, confidence_threshold, exclude_conflicts, include_provenance
/// }` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub query_id: String,
    pub mode: QueryMode,
    pub semantic_query: Option<String>,
    pub coord_filter: Option<CoordFilter>,
    pub temporal_range: Option<(Timestamp, Timestamp)>,
    pub max_results: usize,
    pub confidence_threshold: f64,
    pub exclude_conflicts: bool,
    pub include_provenance: bool,
    /// Seed anchors for ANCHOR_NEIGHBORHOOD.
    pub seed_anchor_ids: Vec<AnchorId>,
    /// Seed utterance (bit-chain) id for PROVENANCE_CHAIN.
    pub seed_utterance_id: Option<String>,
    /// Depth limit for PROVENANCE_CHAIN (spec §4.5: "depth-limited by
    /// query").
    pub depth_limit: Option<u32>,
}

impl Default for RetrievalQuery {
    fn default() -> Self {
        RetrievalQuery {
            query_id: String::new(),
            mode: QueryMode::SemanticSimilarity,
            semantic_query: None,
            coord_filter: None,
            temporal_range: None,
            max_results: 10,
            confidence_threshold: 0.6,
            exclude_conflicts: true,
            include_provenance: true,
            seed_anchor_ids: Vec::new(),
            seed_utterance_id: None,
            depth_limit: None,
        }
    }
}

impl RetrievalQuery {
    /// Validate the fields every mode requires before planning (spec §6:
    /// malformed query -> 400).
    pub fn validate(&self) -> Result<(), String> {
        if self.max_results == 0 {
            return Err("max_results must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err("confidence_threshold must be in [0, 1]".to_string());
        }
        match self.mode {
            QueryMode::SemanticSimilarity | QueryMode::ConflictAware | QueryMode::Composite => {
                if self.semantic_query.is_none() {
                    return Err(format!("{:?} requires semantic_query", self.mode));
                }
            }
            QueryMode::AnchorNeighborhood => {
                if self.seed_anchor_ids.is_empty() {
                    return Err("ANCHOR_NEIGHBORHOOD requires seed_anchor_ids".to_string());
                }
            }
            QueryMode::ProvenanceChain => {
                if self.seed_utterance_id.is_none() {
                    return Err("PROVENANCE_CHAIN requires seed_utterance_id".to_string());
                }
            }
            QueryMode::TemporalSequence => {}
        }
        Ok(())
    }
}

impl ToCanonical for RetrievalQuery {
    fn to_canonical(&self) -> CanonicalValue {
        let temporal = match &self.temporal_range {
            Some((a, b)) => CanonicalValue::Array(vec![
                CanonicalValue::Str(a.to_canonical_string()),
                CanonicalValue::Str(b.to_canonical_string()),
            ]),
            None => CanonicalValue::Null,
        };
        let seeds = CanonicalValue::Array(
            self.seed_anchor_ids
                .iter()
                .map(|id| CanonicalValue::Str(id.to_string()))
                .collect(),
        );
        CanonicalValue::object()
            .field("confidence_threshold", CanonicalValue::Float(self.confidence_threshold))
            .field("exclude_conflicts", CanonicalValue::Bool(self.exclude_conflicts))
            .field("include_provenance", CanonicalValue::Bool(self.include_provenance))
            .field("max_results", CanonicalValue::Int(self.max_results as i64))
            .field("mode", CanonicalValue::Str(self.mode.as_str().to_string()))
            .field("seed_anchor_ids", seeds)
            .field(
                "seed_utterance_id",
                match &self.seed_utterance_id {
                    Some(s) => CanonicalValue::Str(s.clone()),
                    None => CanonicalValue::Null,
                },
            )
            .field(
                "semantic_query",
                match &self.semantic_query {
                    Some(s) => CanonicalValue::Str(s.clone()),
                    None => CanonicalValue::Null,
                },
            )
            .field("temporal_range", temporal)
            .build()
    }
}
