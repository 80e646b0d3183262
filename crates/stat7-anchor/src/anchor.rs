//! The semantic anchor record and its state machine (spec §3/§4.4, C4).

use serde::{Deserialize, Serialize};
use stat7_core::{Coord, Horizon, Polarity, Realm, Timestamp};
use stat7_embed::Embedding;
use std::fmt;

/// Stable integer id within a realm's arena (spec §9: "arena + indices ...
/// indices as stable integer ids").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorId {
    pub realm: Realm,
    pub index: u64,
}

impl AnchorId {
    /// Byte key used to address this anchor in `stat7-store`'s generic
    /// `anchors` tree: the realm tag followed by the big-endian index, so
    /// keys sort first by realm then by insertion order within it.
    pub fn store_key(&self) -> Vec<u8> {
        let mut key = self.realm.as_str().as_bytes().to_vec();
        key.push(b':');
        key.extend_from_slice(&self.index.to_be_bytes());
        key
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.realm, self.index)
    }
}

/// The embedding-indexed, deduplicating wrapper over one or more utterances
/// sharing meaning (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    pub anchor_id: AnchorId,
    pub embedding: Embedding,
    /// Stable witness text: the first writer's concept text (spec §4.4).
    pub concept_text: String,
    pub coord: Coord,
    pub utterance_ids: Vec<String>,
    pub heat: f64,
    pub created_at: Timestamp,
    pub last_updated_at: Timestamp,
    pub provenance_depth: u64,
    pub degraded_embedding: bool,
}

/// Initial heat assigned to a freshly created anchor.
pub const INITIAL_HEAT: f64 = 10.0;

/// Context supplied by the caller when creating a new anchor (spec §4.4's
/// "coordinate assignment for a new anchor").
#[derive(Debug, Clone)]
pub struct CreateContext {
    pub realm: Realm,
    pub polarity: Polarity,
    pub dimensionality: u32,
    /// Ancestor anchors this utterance descends from, used to compute
    /// `lineage = 1 + max(lineage over ancestors)` (spec §4.4).
    pub ancestor_lineages: Vec<u64>,
}

impl Default for CreateContext {
    fn default() -> Self {
        CreateContext {
            realm: Realm::Data,
            polarity: Polarity::Neutral,
            dimensionality: 0,
            ancestor_lineages: Vec::new(),
        }
    }
}

impl CreateContext {
    pub fn lineage(&self) -> u64 {
        self.ancestor_lineages.iter().max().map(|m| m + 1).unwrap_or(0)
    }
}

/// State machine thresholds (spec §4.4): `genesis -> emergence (on first
/// re-hit) -> peak (on heat >= H_peak) -> decay (on idle) ->
/// crystallization (on heat < H_floor and age >= A_crystal)`.
#[derive(Debug, Clone, Copy)]
pub struct StateThresholds {
    pub heat_peak: f64,
    pub heat_floor: f64,
    pub idle_secs: i64,
    pub crystal_age_secs: i64,
}

impl Default for StateThresholds {
    fn default() -> Self {
        StateThresholds {
            heat_peak: 75.0,
            heat_floor: 5.0,
            idle_secs: 3600,
            crystal_age_secs: 86_400,
        }
    }
}

impl Anchor {
    /// Advance the horizon on a re-hit (merge). Transitions are otherwise
    /// scheduled (spec §4.4: "never mid-query"), but a re-hit is itself the
    /// triggering event for the `genesis -> emergence` edge, so it is
    /// applied inline as part of the merge rather than waiting for the next
    /// scheduled decay tick.
    pub fn advance_on_rehit(&mut self) {
        if matches!(self.coord.horizon, Horizon::Genesis) {
            self.set_horizon(Horizon::Emergence);
        }
    }

    /// Apply the scheduled portion of the state machine: heat decay, then
    /// peak/decay/crystallization transitions, evaluated in that order so
    /// that a reactivated (re-heated) anchor can still reach `peak` even
    /// after drifting toward `decay`.
    pub fn apply_scheduled_transition(&mut self, now: Timestamp, thresholds: &StateThresholds) {
        let age = (now.unix_millis() - self.created_at.unix_millis()).max(0) / 1000;
        let idle = (now.unix_millis() - self.last_updated_at.unix_millis()).max(0) / 1000;

        if self.heat < thresholds.heat_floor && age >= thresholds.crystal_age_secs {
            self.set_horizon(Horizon::Crystallization);
        } else if idle >= thresholds.idle_secs
            && !matches!(self.coord.horizon, Horizon::Crystallization)
        {
            self.set_horizon(Horizon::Decay);
        } else if self.heat >= thresholds.heat_peak {
            self.set_horizon(Horizon::Peak);
        }
    }

    fn set_horizon(&mut self, horizon: Horizon) {
        self.coord.horizon = horizon;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineage_is_zero_with_no_ancestors() {
        let ctx = CreateContext::default();
        assert_eq!(ctx.lineage(), 0);
    }

    #[test]
    fn lineage_is_one_plus_max_ancestor() {
        let mut ctx = CreateContext::default();
        ctx.ancestor_lineages = vec![2, 5, 1];
        assert_eq!(ctx.lineage(), 6);
    }

    #[test]
    fn store_key_sorts_by_realm_then_index() {
        let a = AnchorId { realm: Realm::Data, index: 1 };
        let b = AnchorId { realm: Realm::Data, index: 2 };
        assert!(a.store_key() < b.store_key());
    }
}
