//! The retrieval engine: six-mode query planner, scoring, ranking, query
//! cache (spec §4.5, C5).

use crate::cache::{cache_key, QueryCache, DEFAULT_CACHE_TTL_SECONDS};
use crate::conflict::{ConflictDetector, StructuralConflictDetector};
use crate::error::{Result, RetrievalError};
use crate::query::{QueryMode, RetrievalQuery};
use crate::result::{AnchorResult, AssemblyMetadata, ContextAssembly};
use crate::scoring::{score_candidates, ScoredCandidate, ScoringWeights};
use stat7_anchor::{Anchor, AnchorGraph, AnchorId};
use stat7_core::{BitChainId, Realm};
use stat7_embed::EmbeddingProvider;
use stat7_store::Store;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default neighborhood edge floor (spec §6 `theta_edge`).
pub const DEFAULT_THETA_EDGE: f32 = 0.75;

fn realm_key(realm: Realm) -> u8 {
    Realm::ALL.iter().position(|r| *r == realm).unwrap_or(0) as u8
}

pub struct RetrievalEngine {
    anchors: Arc<AnchorGraph>,
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: QueryCache,
    theta_edge: f32,
    conflict_detector: Arc<dyn ConflictDetector>,
    weights: ScoringWeights,
}

impl RetrievalEngine {
    pub fn new(anchors: Arc<AnchorGraph>, store: Arc<Store>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        RetrievalEngine {
            anchors,
            store,
            embedder,
            cache: QueryCache::new(Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS)),
            theta_edge: DEFAULT_THETA_EDGE,
            conflict_detector: Arc::new(StructuralConflictDetector),
            weights: ScoringWeights::default(),
        }
    }

    pub fn with_theta_edge(mut self, theta_edge: f32) -> Self {
        self.theta_edge = theta_edge;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = QueryCache::new(ttl);
        self
    }

    pub fn with_conflict_detector(mut self, detector: Arc<dyn ConflictDetector>) -> Self {
        self.conflict_detector = detector;
        self
    }

    /// `invalidate_cache(reason)` (spec §4.5).
    pub fn invalidate_cache(&self, reason: &str) {
        self.cache.invalidate_all(reason);
    }

    /// Called by the write path (anchor graph insert/update) to drop any
    /// cached result touching the affected anchor (spec §4.5).
    pub fn on_anchor_touched(&self, anchor_id: AnchorId) {
        self.cache.invalidate_touching(anchor_id);
    }

    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            cached_queries: self.cache.len(),
        }
    }

    /// `retrieve(query) -> ContextAssembly` (spec §4.5).
    pub async fn retrieve(&self, query: &RetrievalQuery) -> Result<ContextAssembly> {
        query
            .validate()
            .map_err(RetrievalError::MalformedQuery)?;

        let key = cache_key(query);
        if let Some(mut cached) = self.cache.get(&key) {
            cached.aggregate.cache_hit = true;
            return Ok(cached);
        }

        // Embed outside the timed region: spec §8 P-RETRIEVAL-LATENCY and
        // scenario 2 measure latency "excluding embedding", so the embed
        // call (the only suspension point any mode needs) must happen
        // before `start` below, not inside the scan/score/rank work.
        let embedded = match query.mode {
            QueryMode::SemanticSimilarity | QueryMode::ConflictAware | QueryMode::Composite => {
                let text = query
                    .semantic_query
                    .as_ref()
                    .ok_or_else(|| RetrievalError::MalformedQuery("semantic_query required".into()))?;
                Some(self.embed_query(text).await?)
            }
            QueryMode::TemporalSequence | QueryMode::AnchorNeighborhood | QueryMode::ProvenanceChain => None,
        };

        let start = Instant::now();
        let (mut assembly, touched) = match query.mode {
            QueryMode::SemanticSimilarity => {
                let (embedding, degraded) = embedded.as_ref().expect("embedded above");
                self.retrieve_semantic(query, embedding, *degraded)?
            }
            QueryMode::TemporalSequence => self.retrieve_temporal(query)?,
            QueryMode::AnchorNeighborhood => self.retrieve_neighborhood(query)?,
            QueryMode::ProvenanceChain => self.retrieve_provenance(query)?,
            QueryMode::ConflictAware => {
                let (embedding, degraded) = embedded.as_ref().expect("embedded above");
                self.retrieve_conflict_aware(query, embedding, *degraded)?
            }
            QueryMode::Composite => {
                let (embedding, degraded) = embedded.as_ref().expect("embedded above");
                self.retrieve_composite(query, embedding, *degraded)?
            }
        };
        assembly.aggregate.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        assembly.aggregate.cache_hit = false;

        if assembly.aggregate.reason.is_none() {
            self.cache.put(key, assembly.clone(), touched);
        }
        Ok(assembly)
    }

    fn matches_filter(&self, anchor: &Anchor, query: &RetrievalQuery) -> bool {
        query
            .coord_filter
            .as_ref()
            .map(|f| f.matches(&anchor.coord))
            .unwrap_or(true)
    }

    async fn embed_query(&self, text: &str) -> Result<(stat7_embed::Embedding, bool)> {
        let outcome = self.embedder.embed_checked(text).await?;
        Ok((outcome.embedding, outcome.degraded))
    }

    fn retrieve_semantic(
        &self,
        query: &RetrievalQuery,
        embedding: &stat7_embed::Embedding,
        degraded: bool,
    ) -> Result<(ContextAssembly, HashSet<AnchorId>)> {
        let all = self.anchors.all_anchors();
        let total_scanned = all.len();
        let mut filtered: Vec<&Anchor> = all
            .iter()
            .filter(|a| self.matches_filter(a, query))
            .collect();
        filtered.sort_by(|a, b| a.anchor_id.index.cmp(&b.anchor_id.index));

        let confidence = query.confidence_threshold as f32;
        let mut scored: Vec<(&Anchor, f32)> = filtered
            .iter()
            .map(|a| (*a, stat7_embed::cosine_similarity(&embedding, &a.embedding)))
            .filter(|(_, score)| *score >= confidence)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(query.max_results);

        if scored.is_empty() {
            return Ok((ContextAssembly::empty_no_results(total_scanned, 0.0), HashSet::new()));
        }

        let candidates: Vec<ScoredCandidate> = scored
            .iter()
            .map(|(a, s)| ScoredCandidate {
                cosine: *s,
                adjacency: a.coord.adjacency,
                realm_key: realm_key(a.coord.realm),
            })
            .collect();
        let relevance = score_candidates(&candidates, &self.weights);

        let mut touched = HashSet::new();
        let results = scored
            .iter()
            .zip(relevance)
            .map(|((anchor, cosine), score)| {
                touched.insert(anchor.anchor_id);
                self.build_result(anchor, score, 0, *cosine, query.include_provenance, Vec::new())
            })
            .collect();

        Ok((
            ContextAssembly {
                results,
                aggregate: AssemblyMetadata { total_scanned, degraded, ..Default::default() },
            },
            touched,
        ))
    }

    fn retrieve_temporal(&self, query: &RetrievalQuery) -> Result<(ContextAssembly, HashSet<AnchorId>)> {
        let all = self.anchors.all_anchors();
        let total_scanned = all.len();
        let mut filtered: Vec<&Anchor> = all
            .iter()
            .filter(|a| self.matches_filter(a, query))
            .filter(|a| match &query.temporal_range {
                Some((from, to)) => a.created_at >= *from && a.created_at <= *to,
                None => true,
            })
            .collect();

        // Rank by recency descending, stable tie-break by anchor_id (spec §4.5).
        filtered.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.anchor_id.index.cmp(&b.anchor_id.index))
        });
        filtered.truncate(query.max_results);

        if filtered.is_empty() {
            return Ok((ContextAssembly::empty_no_results(total_scanned, 0.0), HashSet::new()));
        }

        let now = stat7_core::Timestamp::now();
        let mut touched = HashSet::new();
        let results = filtered
            .iter()
            .enumerate()
            .map(|(rank, anchor)| {
                touched.insert(anchor.anchor_id);
                let temporal_distance = now.unix_millis() - anchor.created_at.unix_millis();
                let recency_score = 1.0 / (1.0 + rank as f64 * 0.1);
                AnchorResult {
                    anchor_id: anchor.anchor_id,
                    relevance_score: recency_score,
                    temporal_distance,
                    anchor_connections: Vec::new(),
                    provenance_depth: anchor.provenance_depth,
                    conflict_flags: Vec::new(),
                    metadata: BTreeMap::new(),
                }
            })
            .collect();

        Ok((
            ContextAssembly {
                results,
                aggregate: AssemblyMetadata { total_scanned, ..Default::default() },
            },
            touched,
        ))
    }

    fn retrieve_neighborhood(&self, query: &RetrievalQuery) -> Result<(ContextAssembly, HashSet<AnchorId>)> {
        if query.seed_anchor_ids.is_empty() {
            return Err(RetrievalError::MalformedQuery(
                "ANCHOR_NEIGHBORHOOD requires seed_anchor_ids".into(),
            ));
        }

        // BFS over the adjacency graph, edges = cosine >= theta_edge (spec §4.5).
        let mut visited: HashMap<AnchorId, (u32, f32)> = HashMap::new();
        let mut queue: VecDeque<(AnchorId, u32)> = VecDeque::new();
        for seed in &query.seed_anchor_ids {
            visited.insert(*seed, (0, 1.0));
            queue.push_back((*seed, 0));
        }

        let mut total_scanned = 0usize;
        while let Some((current, hop)) = queue.pop_front() {
            total_scanned += 1;
            for (neighbor, score) in self.anchors.neighbors(current, self.theta_edge) {
                let entry = visited.entry(neighbor).or_insert((u32::MAX, 0.0));
                if hop + 1 < entry.0 {
                    *entry = (hop + 1, score);
                    queue.push_back((neighbor, hop + 1));
                }
            }
        }

        // Exclude the seeds themselves from the returned set.
        for seed in &query.seed_anchor_ids {
            visited.remove(seed);
        }

        let mut ranked: Vec<(AnchorId, u32, f32)> =
            visited.into_iter().map(|(id, (hop, score))| (id, hop, score)).collect();
        ranked.sort_by(|a, b| {
            a.1.cmp(&b.1)
                .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
        });
        ranked.truncate(query.max_results);

        if ranked.is_empty() {
            return Ok((ContextAssembly::empty_no_results(total_scanned, 0.0), HashSet::new()));
        }

        let mut touched = HashSet::new();
        let mut results = Vec::new();
        for (id, hop, score) in ranked {
            if let Some(anchor) = self.anchors.get(id) {
                touched.insert(id);
                let connections: Vec<AnchorId> = self
                    .anchors
                    .neighbors(id, self.theta_edge)
                    .into_iter()
                    .map(|(n, _)| n)
                    .collect();
                results.push(AnchorResult {
                    anchor_id: id,
                    relevance_score: score as f64 / (1.0 + hop as f64),
                    temporal_distance: 0,
                    anchor_connections: connections,
                    provenance_depth: anchor.provenance_depth,
                    conflict_flags: Vec::new(),
                    metadata: BTreeMap::from([("hop_distance".to_string(), hop.to_string())]),
                });
            }
        }

        Ok((
            ContextAssembly {
                results,
                aggregate: AssemblyMetadata { total_scanned, ..Default::default() },
            },
            touched,
        ))
    }

    fn retrieve_provenance(&self, query: &RetrievalQuery) -> Result<(ContextAssembly, HashSet<AnchorId>)> {
        let seed = query
            .seed_utterance_id
            .as_ref()
            .ok_or_else(|| RetrievalError::MalformedQuery("PROVENANCE_CHAIN requires seed_utterance_id".into()))?;
        let depth_limit = query.depth_limit.unwrap_or(u32::MAX);

        let mut current = BitChainId::from_hex(seed)
            .map_err(|e| RetrievalError::MalformedQuery(format!("invalid seed_utterance_id: {e}")))?;
        let mut results = Vec::new();
        let mut touched = HashSet::new();
        let mut total_scanned = 0usize;
        let mut depth = 0u32;

        loop {
            if depth >= depth_limit {
                break;
            }
            let Some(bitchain) = self.store.get_bitchain(&current)? else {
                break;
            };
            total_scanned += 1;
            if let Some(anchor_id) = self.anchors.anchor_for_utterance(&current.to_hex()) {
                if self.anchors.get(anchor_id).is_some() {
                    touched.insert(anchor_id);
                    results.push(AnchorResult {
                        anchor_id,
                        relevance_score: 1.0 / (1.0 + depth as f64),
                        temporal_distance: 0,
                        anchor_connections: Vec::new(),
                        provenance_depth: depth as u64,
                        conflict_flags: Vec::new(),
                        metadata: BTreeMap::from([("bitchain_id".to_string(), current.to_hex())]),
                    });
                }
            }

            match bitchain.provenance_chain.first() {
                Some(next) => {
                    current = *next;
                    depth += 1;
                }
                None => break,
            }
        }

        if results.is_empty() {
            return Ok((ContextAssembly::empty_no_results(total_scanned, 0.0), HashSet::new()));
        }
        results.truncate(query.max_results);

        Ok((
            ContextAssembly {
                results,
                aggregate: AssemblyMetadata { total_scanned, ..Default::default() },
            },
            touched,
        ))
    }

    fn retrieve_conflict_aware(
        &self,
        query: &RetrievalQuery,
        embedding: &stat7_embed::Embedding,
        degraded: bool,
    ) -> Result<(ContextAssembly, HashSet<AnchorId>)> {
        let (mut assembly, touched) = self.retrieve_semantic(query, embedding, degraded)?;
        if assembly.aggregate.reason.is_some() {
            return Ok((assembly, touched));
        }

        // Build a synthetic query-context anchor for conflict comparison —
        // its coord carries the query's own filter intent (realm/polarity),
        // not any stored anchor's identity.
        let query_anchor = synthetic_query_anchor(embedding, query);

        for result in assembly.results.iter_mut() {
            if let Some(anchor) = self.anchors.get(result.anchor_id) {
                result.conflict_flags = self.conflict_detector.conflicts(&self.anchors, &anchor, &query_anchor);
            }
        }

        if query.exclude_conflicts {
            assembly.results.retain(|r| r.conflict_flags.is_empty());
        }
        if assembly.results.is_empty() {
            return Ok((ContextAssembly::empty_no_results(assembly.aggregate.total_scanned, 0.0), HashSet::new()));
        }

        Ok((assembly, touched))
    }

    fn retrieve_composite(
        &self,
        query: &RetrievalQuery,
        embedding: &stat7_embed::Embedding,
        query_degraded: bool,
    ) -> Result<(ContextAssembly, HashSet<AnchorId>)> {
        let mut merged: HashMap<AnchorId, AnchorResult> = HashMap::new();
        let mut touched = HashSet::new();
        let mut total_scanned = 0usize;
        let mut degraded = false;

        if query.semantic_query.is_some() {
            let (assembly, t) = self.retrieve_semantic(query, embedding, query_degraded)?;
            total_scanned += assembly.aggregate.total_scanned;
            degraded |= assembly.aggregate.degraded;
            touched.extend(t);
            merge_results(&mut merged, assembly.results);
        }
        if !query.seed_anchor_ids.is_empty() {
            let (assembly, t) = self.retrieve_neighborhood(query)?;
            total_scanned += assembly.aggregate.total_scanned;
            touched.extend(t);
            merge_results(&mut merged, assembly.results);
        }
        {
            let (assembly, t) = self.retrieve_temporal(query)?;
            total_scanned += assembly.aggregate.total_scanned;
            touched.extend(t);
            merge_results(&mut merged, assembly.results);
        }

        let mut results: Vec<AnchorResult> = merged.into_values().collect();
        results.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(query.max_results);

        if results.is_empty() {
            return Ok((ContextAssembly::empty_no_results(total_scanned, 0.0), HashSet::new()));
        }

        Ok((
            ContextAssembly {
                results,
                aggregate: AssemblyMetadata { total_scanned, degraded, ..Default::default() },
            },
            touched,
        ))
    }

    fn build_result(
        &self,
        anchor: &Anchor,
        relevance_score: f64,
        temporal_distance: i64,
        _cosine: f32,
        include_provenance: bool,
        conflict_flags: Vec<String>,
    ) -> AnchorResult {
        let connections = self
            .anchors
            .neighbors(anchor.anchor_id, self.theta_edge)
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        AnchorResult {
            anchor_id: anchor.anchor_id,
            relevance_score,
            temporal_distance,
            anchor_connections: connections,
            provenance_depth: if include_provenance { anchor.provenance_depth } else { 0 },
            conflict_flags,
            metadata: BTreeMap::new(),
        }
    }
}

fn merge_results(merged: &mut HashMap<AnchorId, AnchorResult>, incoming: Vec<AnchorResult>) {
    for result in incoming {
        merged
            .entry(result.anchor_id)
            .and_modify(|existing| {
                if result.relevance_score > existing.relevance_score {
                    existing.relevance_score = result.relevance_score;
                }
            })
            .or_insert(result);
    }
}

/// Build a transient anchor used only as the comparison point for conflict
/// detection (spec §4.5/§9): it never touches the graph or store, it is
/// just a carrier for the query's own realm/polarity intent via the coord
/// filter.
fn synthetic_query_anchor(embedding: &stat7_embed::Embedding, query: &RetrievalQuery) -> Anchor {
    let filter = query.coord_filter.clone().unwrap_or_default();
    let realm = filter.realm.unwrap_or(Realm::Data);
    let polarity = filter.polarity.unwrap_or(stat7_core::Polarity::Neutral);
    let horizon = filter.horizon.unwrap_or(stat7_core::Horizon::Genesis);
    let coord = stat7_core::Coord::new(realm, 0, 0.0, horizon, 0.0, polarity, 0)
        .expect("synthetic query coord is always in-range");
    Anchor {
        anchor_id: AnchorId { realm, index: u64::MAX },
        embedding: embedding.clone(),
        concept_text: String::new(),
        coord,
        utterance_ids: Vec::new(),
        heat: 0.0,
        created_at: stat7_core::Timestamp::now(),
        last_updated_at: stat7_core::Timestamp::now(),
        provenance_depth: 0,
        degraded_embedding: false,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineMetrics {
    pub cached_queries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryMode;
    use stat7_anchor::CreateContext;
    use stat7_core::Polarity;

    async fn engine() -> (RetrievalEngine, Arc<AnchorGraph>) {
        let store = Arc::new(Store::open_temporary().unwrap());
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(stat7_embed::LocalProvider::new(32));
        let graph = Arc::new(AnchorGraph::new(store.clone(), embedder.clone(), 0.92));
        let eng = RetrievalEngine::new(graph.clone(), store, embedder);
        (eng, graph)
    }

    fn ctx() -> CreateContext {
        CreateContext {
            realm: Realm::Data,
            polarity: Polarity::Neutral,
            dimensionality: 0,
            ancestor_lineages: vec![],
        }
    }

    #[tokio::test]
    async fn semantic_query_returns_matches_above_threshold() {
        let (eng, graph) = engine().await;
        graph.create_or_update_anchor("debugging a slow database query", "u1", ctx()).await.unwrap();
        graph.create_or_update_anchor("a recipe for chocolate cake", "u2", ctx()).await.unwrap();

        let mut query = RetrievalQuery {
            query_id: "q1".to_string(),
            mode: QueryMode::SemanticSimilarity,
            semantic_query: Some("debugging a slow database query".to_string()),
            confidence_threshold: 0.5,
            ..Default::default()
        };
        query.query_id = "q1".to_string();
        let assembly = eng.retrieve(&query).await.unwrap();
        assert!(!assembly.results.is_empty());
        assert_eq!(assembly.results[0].relevance_score > 0.0, true);
    }

    #[tokio::test]
    async fn no_results_above_threshold_is_not_an_error() {
        let (eng, graph) = engine().await;
        graph.create_or_update_anchor("alpha", "u1", ctx()).await.unwrap();

        let query = RetrievalQuery {
            mode: QueryMode::SemanticSimilarity,
            semantic_query: Some("completely unrelated beta gamma delta".to_string()),
            confidence_threshold: 0.99,
            ..Default::default()
        };
        let assembly = eng.retrieve(&query).await.unwrap();
        assert!(assembly.results.is_empty());
        assert_eq!(assembly.aggregate.reason.as_deref(), Some("no_results_above_threshold"));
    }

    #[tokio::test]
    async fn malformed_query_is_rejected() {
        let (eng, _graph) = engine().await;
        let query = RetrievalQuery {
            mode: QueryMode::SemanticSimilarity,
            semantic_query: None,
            ..Default::default()
        };
        assert!(matches!(eng.retrieve(&query).await, Err(RetrievalError::MalformedQuery(_))));
    }

    #[tokio::test]
    async fn second_identical_query_is_a_cache_hit() {
        let (eng, graph) = engine().await;
        graph.create_or_update_anchor("cache me please", "u1", ctx()).await.unwrap();
        let query = RetrievalQuery {
            mode: QueryMode::SemanticSimilarity,
            semantic_query: Some("cache me please".to_string()),
            confidence_threshold: 0.5,
            ..Default::default()
        };
        let first = eng.retrieve(&query).await.unwrap();
        assert!(!first.aggregate.cache_hit);
        let second = eng.retrieve(&query).await.unwrap();
        assert!(second.aggregate.cache_hit);
    }

    #[tokio::test]
    async fn anchor_neighborhood_excludes_seed_and_ranks_by_hop() {
        let (eng, graph) = engine().await;
        let a = graph.create_or_update_anchor("shared topic alpha version one", "u1", ctx()).await.unwrap();
        let _b = graph
            .create_or_update_anchor("shared topic alpha version two nearly identical", "u2", ctx())
            .await
            .unwrap();

        let query = RetrievalQuery {
            mode: QueryMode::AnchorNeighborhood,
            seed_anchor_ids: vec![a],
            ..Default::default()
        };
        let assembly = eng.retrieve(&query).await.unwrap();
        for r in &assembly.results {
            assert_ne!(r.anchor_id, a);
        }
    }
}
