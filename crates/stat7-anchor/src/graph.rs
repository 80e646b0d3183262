//! The semantic anchor graph: dedup store keyed by embedding similarity,
//! with heat/decay and an append-only adjacency edge set (spec §4.4, §9).

use crate::anchor::{Anchor, CreateContext, StateThresholds, INITIAL_HEAT};
use crate::error::{AnchorError, Result};
use crate::AnchorId;
use dashmap::DashMap;
use parking_lot::RwLock;
use stat7_core::{Coord, Horizon, Realm, Timestamp};
use stat7_embed::{cosine_similarity, EmbeddingProvider};
use stat7_store::Store;
use std::sync::Arc;
use tracing::{debug, info};

/// Default similarity floor for anchor dedup (spec §6 `theta_merge`).
pub const DEFAULT_THETA_MERGE: f32 = 0.92;

/// One realm's anchor arena (spec §9: "arena + indices ... one arena per
/// realm"). Single-writer, multi-reader per realm (spec §5): the
/// `parking_lot::RwLock` gives exactly that.
#[derive(Default)]
struct RealmArena {
    anchors: Vec<Anchor>,
}

pub struct AnchorGraph {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    realms: DashMap<Realm, RwLock<RealmArena>>,
    /// Append-only adjacency edge set, `(id, id)` pairs with `id_a < id_b`
    /// (spec §9). Computed at insertion time against every existing anchor.
    edges: RwLock<Vec<(AnchorId, AnchorId, f32)>>,
    /// Append-only explicit conflict links (spec §4.5 CONFLICT_AWARE /
    /// §9 open question: "or if an explicit conflict link has been
    /// recorded between them").
    conflict_links: RwLock<Vec<(AnchorId, AnchorId)>>,
    /// Reverse index from utterance id (a bit-chain id, rendered hex) to
    /// the anchor that absorbed it. Lets PROVENANCE_CHAIN retrieval walk a
    /// bit-chain's provenance chain and resolve each hop back to an anchor.
    utterance_index: DashMap<String, AnchorId>,
    theta_merge: f32,
}

impl AnchorGraph {
    pub fn new(store: Arc<Store>, embedder: Arc<dyn EmbeddingProvider>, theta_merge: f32) -> Self {
        AnchorGraph {
            store,
            embedder,
            realms: DashMap::new(),
            edges: RwLock::new(Vec::new()),
            conflict_links: RwLock::new(Vec::new()),
            utterance_index: DashMap::new(),
            theta_merge,
        }
    }

    /// Resolve a bit-chain/utterance id back to the anchor that holds it,
    /// used by PROVENANCE_CHAIN retrieval.
    pub fn anchor_for_utterance(&self, utterance_id: &str) -> Option<AnchorId> {
        self.utterance_index.get(utterance_id).map(|r| *r)
    }

    fn realm_arena(&self, realm: Realm) -> dashmap::mapref::one::Ref<'_, Realm, RwLock<RealmArena>> {
        self.realms.entry(realm).or_default();
        self.realms.get(&realm).expect("just inserted")
    }

    /// `get(anchor_id) -> anchor?` (spec §4.4).
    pub fn get(&self, anchor_id: AnchorId) -> Option<Anchor> {
        let arena = self.realm_arena(anchor_id.realm);
        let guard = arena.read();
        guard.anchors.get(anchor_id.index as usize).cloned()
    }

    /// `find_similar(embedding, k, threshold) -> [(anchor_id, score)]`
    /// (spec §4.4): top-k by cosine across every realm, filtered by
    /// `threshold`.
    pub fn find_similar(
        &self,
        embedding: &stat7_embed::Embedding,
        k: usize,
        threshold: f32,
    ) -> Vec<(AnchorId, f32)> {
        let mut scored: Vec<(AnchorId, f32)> = Vec::new();
        for entry in self.realms.iter() {
            let guard = entry.value().read();
            for anchor in guard.anchors.iter() {
                let score = cosine_similarity(embedding, &anchor.embedding);
                if score >= threshold {
                    scored.push((anchor.anchor_id, score));
                }
            }
        }
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.index.cmp(&b.0.index))
        });
        scored.truncate(k);
        scored
    }

    /// `create_or_update_anchor(concept_text, utterance_id, context) ->
    /// anchor_id` (spec §4.4): the deduplicating insert.
    pub async fn create_or_update_anchor(
        &self,
        concept_text: &str,
        utterance_id: &str,
        context: CreateContext,
    ) -> Result<AnchorId> {
        let outcome = self.embedder.embed_checked(concept_text).await?;
        let now = Timestamp::now();

        // Tight-floor similarity search; tie-break by heat then created_at
        // (spec §4.4), both already captured by insertion order within a
        // realm's arena for anchors created at the same instant, so we
        // break ties by higher heat first, then lower index (earlier wins).
        let mut candidates = self.find_similar(&outcome.embedding, usize::MAX, self.theta_merge);
        candidates.sort_by(|a, b| {
            let anchor_a = self.get(a.0);
            let anchor_b = self.get(b.0);
            match (anchor_a, anchor_b) {
                (Some(aa), Some(ab)) => ab
                    .heat
                    .partial_cmp(&aa.heat)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| aa.created_at.cmp(&ab.created_at)),
                _ => std::cmp::Ordering::Equal,
            }
        });

        if let Some((existing_id, _score)) = candidates.first().copied() {
            self.merge_into(existing_id, utterance_id, now, outcome.degraded)?;
            return Ok(existing_id);
        }

        self.insert_new(concept_text, utterance_id, &outcome.embedding, context, now, outcome.degraded)
    }

    fn merge_into(
        &self,
        id: AnchorId,
        utterance_id: &str,
        now: Timestamp,
        degraded: bool,
    ) -> Result<()> {
        let arena = self.realm_arena(id.realm);
        let mut guard = arena.write();
        let anchor = guard
            .anchors
            .get_mut(id.index as usize)
            .ok_or(AnchorError::NotFound(id))?;

        // Stable witness: concept_text is never overwritten by a merge
        // (spec §4.4); the new variant only contributes its utterance id.
        anchor.utterance_ids.push(utterance_id.to_string());
        anchor.heat += INITIAL_HEAT * 0.1;
        anchor.last_updated_at = now;
        anchor.degraded_embedding = anchor.degraded_embedding || degraded;
        anchor.advance_on_rehit();

        self.store.put_anchor(&id.store_key(), &*anchor)?;
        self.utterance_index.insert(utterance_id.to_string(), id);
        debug!(anchor = %id, utterances = anchor.utterance_ids.len(), "merged utterance into existing anchor");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_new(
        &self,
        concept_text: &str,
        utterance_id: &str,
        embedding: &stat7_embed::Embedding,
        context: CreateContext,
        now: Timestamp,
        degraded: bool,
    ) -> Result<AnchorId> {
        let realm = context.realm;
        let max_cosine_same_realm = {
            let arena = self.realm_arena(realm);
            let guard = arena.read();
            guard
                .anchors
                .iter()
                .map(|a| cosine_similarity(embedding, &a.embedding))
                .fold(0.0_f32, f32::max)
        };
        let adjacency = (max_cosine_same_realm as f64) * 100.0;

        let coord = Coord::new(
            realm,
            context.lineage(),
            adjacency,
            Horizon::Genesis,
            INITIAL_HEAT,
            context.polarity,
            context.dimensionality,
        )?;

        let arena = self.realm_arena(realm);
        let mut guard = arena.write();
        let index = guard.anchors.len() as u64;
        let anchor_id = AnchorId { realm, index };

        let anchor = Anchor {
            anchor_id,
            embedding: embedding.clone(),
            concept_text: concept_text.to_string(),
            coord,
            utterance_ids: vec![utterance_id.to_string()],
            heat: INITIAL_HEAT,
            created_at: now,
            last_updated_at: now,
            provenance_depth: context.ancestor_lineages.len() as u64,
            degraded_embedding: degraded,
        };

        self.store.put_anchor(&anchor_id.store_key(), &anchor)?;
        self.record_edges(&guard.anchors, &anchor);
        self.utterance_index.insert(utterance_id.to_string(), anchor_id);
        guard.anchors.push(anchor);

        info!(anchor = %anchor_id, realm = %realm, "created new anchor");
        Ok(anchor_id)
    }

    fn record_edges(&self, existing: &[Anchor], new_anchor: &Anchor) {
        const THETA_EDGE_DEFAULT: f32 = 0.75;
        let mut edges = self.edges.write();
        for other in existing {
            let score = cosine_similarity(&new_anchor.embedding, &other.embedding);
            if score >= THETA_EDGE_DEFAULT {
                edges.push((other.anchor_id, new_anchor.anchor_id, score));
            }
        }
    }

    /// Neighbors of `anchor_id` with cosine >= `theta_edge` (spec §4.5
    /// ANCHOR_NEIGHBORHOOD: "edges = cosine >= theta_edge").
    pub fn neighbors(&self, anchor_id: AnchorId, theta_edge: f32) -> Vec<(AnchorId, f32)> {
        self.edges
            .read()
            .iter()
            .filter(|(a, b, score)| *score >= theta_edge && (*a == anchor_id || *b == anchor_id))
            .map(|(a, b, score)| if *a == anchor_id { (*b, *score) } else { (*a, *score) })
            .collect()
    }

    pub fn record_conflict(&self, a: AnchorId, b: AnchorId) {
        self.conflict_links.write().push((a, b));
    }

    pub fn has_conflict_link(&self, a: AnchorId, b: AnchorId) -> bool {
        self.conflict_links
            .read()
            .iter()
            .any(|(x, y)| (*x == a && *y == b) || (*x == b && *y == a))
    }

    /// `heat_decay(now)` (spec §4.4): applies exponential decay to every
    /// anchor and evaluates scheduled state transitions. Run on a
    /// schedule, never mid-query (spec §4.4/§9).
    pub fn heat_decay(&self, now: Timestamp, lambda: f64, thresholds: &StateThresholds) -> Result<()> {
        for entry in self.realms.iter() {
            let mut guard = entry.value().write();
            for anchor in guard.anchors.iter_mut() {
                let dt_secs =
                    ((now.unix_millis() - anchor.last_updated_at.unix_millis()).max(0) as f64) / 1000.0;
                anchor.heat *= (-lambda * dt_secs).exp();
                anchor.apply_scheduled_transition(now, thresholds);
                self.store.put_anchor(&anchor.anchor_id.store_key(), anchor)?;
            }
        }
        Ok(())
    }

    pub fn anchor_count(&self) -> usize {
        self.realms.iter().map(|e| e.value().read().anchors.len()).sum()
    }

    pub fn all_anchors(&self) -> Vec<Anchor> {
        self.realms
            .iter()
            .flat_map(|e| e.value().read().anchors.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stat7_core::{Polarity, Realm};
    use stat7_embed::LocalProvider;

    fn graph() -> AnchorGraph {
        let store = Arc::new(Store::open_temporary().unwrap());
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(LocalProvider::new(32));
        AnchorGraph::new(store, embedder, DEFAULT_THETA_MERGE)
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
    async fn dedup_on_near_identical_text() {
        // spec §8 scenario 3.
        let g = graph();
        let id1 = g
            .create_or_update_anchor("User wants to debug performance issues", "u1", ctx())
            .await
            .unwrap();
        let id2 = g
            .create_or_update_anchor("User wants to debug performance issues.", "u2", ctx())
            .await
            .unwrap();
        assert_eq!(id1, id2);
        let anchor = g.get(id1).unwrap();
        assert_eq!(anchor.utterance_ids, vec!["u1".to_string(), "u2".to_string()]);
        assert_eq!(g.anchor_count(), 1);
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        // spec §8 P-MERGE-IDEMPOTENT.
        let g = graph();
        g.create_or_update_anchor("same text twice", "u1", ctx()).await.unwrap();
        g.create_or_update_anchor("same text twice", "u1", ctx()).await.unwrap();
        assert_eq!(g.anchor_count(), 1);
        let anchors = g.all_anchors();
        assert_eq!(anchors[0].utterance_ids.len(), 2);
    }

    #[tokio::test]
    async fn distinct_concepts_create_distinct_anchors() {
        let g = graph();
        let id1 = g.create_or_update_anchor("alpha concept", "u1", ctx()).await.unwrap();
        let id2 = g.create_or_update_anchor("totally different beta topic", "u2", ctx()).await.unwrap();
        assert_ne!(id1, id2);
        assert_eq!(g.anchor_count(), 2);
    }

    #[tokio::test]
    async fn witness_text_is_stable_across_merges() {
        let g = graph();
        let id1 = g.create_or_update_anchor("User wants to debug performance issues", "u1", ctx()).await.unwrap();
        g.create_or_update_anchor("User wants to debug performance issues.", "u2", ctx()).await.unwrap();
        let anchor = g.get(id1).unwrap();
        assert_eq!(anchor.concept_text, "User wants to debug performance issues");
    }
}
