//! The conservator (spec §4.8, C8): bounded auto-repair of ESCAPED records,
//! opt-in per realm. A fixed, registered table of repair actions — no new
//! code paths, no schema changes (spec §4.8) — applied at most once per
//! admission attempt, then C6 is re-invoked on the result.

use serde::{Deserialize, Serialize};
use stat7_core::{BitChain, Realm};
use std::collections::HashSet;

/// One bounded repair action taken during a single repair pass (spec
/// §4.8's fixed action table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RepairAction {
    /// `adjacency`/`luminosity` clamped back into `[0, 100]`.
    ClampedCoordField { field: &'static str, from: f64, to: f64 },
    /// Non-canonical leading/trailing whitespace stripped from the text
    /// payload.
    StrippedPayloadWhitespace,
    /// No repair action applied (the record needed none of the above).
    NoneNeeded,
}

/// Snapshot of the record before repair, kept for the repair-failure
/// record spec §4.8 requires when a repair pass does not resolve to
/// BOUND.
#[derive(Debug, Clone)]
pub struct RepairSnapshot {
    pub bitchain_id: String,
    pub coord_before: stat7_core::Coord,
}

/// Result of one repair pass (spec §4.8: "at most one repair pass per
/// record per admission attempt").
#[derive(Debug, Clone)]
pub struct RepairResult {
    pub snapshot: RepairSnapshot,
    pub repaired: BitChain,
    pub actions: Vec<RepairAction>,
}

/// The conservator. Opt-in per realm (spec §4.8: "opt-in per module/realm").
pub struct Conservator {
    enabled_realms: HashSet<Realm>,
}

impl Conservator {
    pub fn new(enabled_realms: impl IntoIterator<Item = Realm>) -> Self {
        Conservator {
            enabled_realms: enabled_realms.into_iter().collect(),
        }
    }

    pub fn is_enabled_for(&self, realm: Realm) -> bool {
        self.enabled_realms.contains(&realm)
    }

    /// Apply the registered repair table to `bc`. Returns `None` if this
    /// realm has not opted into repair (spec §4.8), in which case the
    /// caller should route straight to `ESCAPED_NOT_REPAIRED`.
    pub fn repair(&self, bc: &BitChain) -> Option<stat7_core::Result<RepairResult>> {
        if !self.is_enabled_for(bc.coord.realm) {
            return None;
        }
        Some(self.repair_unconditionally(bc))
    }

    fn repair_unconditionally(&self, bc: &BitChain) -> stat7_core::Result<RepairResult> {
        let snapshot = RepairSnapshot {
            bitchain_id: bc.id.to_hex(),
            coord_before: bc.coord,
        };

        let mut actions = Vec::new();
        let mut coord = bc.coord;

        let clamped_adjacency = coord.adjacency.clamp(0.0, 100.0);
        if clamped_adjacency != coord.adjacency {
            actions.push(RepairAction::ClampedCoordField {
                field: "adjacency",
                from: coord.adjacency,
                to: clamped_adjacency,
            });
            coord.adjacency = clamped_adjacency;
        }

        let clamped_luminosity = coord.luminosity.clamp(0.0, 100.0);
        if clamped_luminosity != coord.luminosity {
            actions.push(RepairAction::ClampedCoordField {
                field: "luminosity",
                from: coord.luminosity,
                to: clamped_luminosity,
            });
            coord.luminosity = clamped_luminosity;
        }

        let repaired_coord = stat7_core::Coord::new(
            coord.realm,
            coord.lineage,
            coord.adjacency,
            coord.horizon,
            coord.luminosity,
            coord.polarity,
            coord.dimensionality,
        )?;

        let mut payload = bc.payload.clone();
        if let Some(text) = &payload.text {
            let stripped = strip_noncanonical_whitespace(text);
            if stripped != *text {
                actions.push(RepairAction::StrippedPayloadWhitespace);
                payload = stat7_core::bitchain::Payload::from_text(stripped);
            }
        }

        if actions.is_empty() {
            actions.push(RepairAction::NoneNeeded);
        }

        let repaired = stat7_core::BitChain::new(
            repaired_coord,
            payload,
            bc.lineage_parent_id,
            bc.provenance_chain.clone(),
            bc.signature.clone(),
        )?;

        Ok(RepairResult {
            snapshot,
            repaired,
            actions,
        })
    }
}

/// Strip leading/trailing whitespace and collapse internal runs of
/// whitespace to single spaces — the "non-canonical whitespace" spec §4.8
/// names as a repairable payload defect.
fn strip_noncanonical_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stat7_core::{Coord, Horizon, Payload, Polarity};

    fn escaped_coord() -> Coord {
        // `Coord::new` validates range; an ingress candidate built via
        // `from_raw_unchecked` is how an out-of-range claimed coordinate
        // reaches the admission pipeline in the first place (spec §4.8
        // scenario 5).
        Coord::from_raw_unchecked(Realm::Data, 1, 500.0, Horizon::Genesis, 10.0, Polarity::P0, 0).unwrap()
    }

    #[test]
    fn disabled_realm_returns_none() {
        let conservator = Conservator::new([]);
        let bc = BitChain::new(escaped_coord(), Payload::from_text("hi"), None, vec![], None).unwrap();
        assert!(conservator.repair(&bc).is_none());
    }

    #[test]
    fn out_of_range_adjacency_is_clamped() {
        let conservator = Conservator::new([Realm::Data]);
        let bc = BitChain::new(escaped_coord(), Payload::from_text("hi"), None, vec![], None).unwrap();
        let result = conservator.repair(&bc).unwrap().unwrap();
        assert_eq!(result.repaired.coord.adjacency, 100.0);
        assert!(result.actions.iter().any(|a| matches!(a, RepairAction::ClampedCoordField { field: "adjacency", .. })));
    }

    #[test]
    fn whitespace_is_normalized() {
        let conservator = Conservator::new([Realm::Data]);
        let coord = Coord::new(Realm::Data, 1, 50.0, Horizon::Genesis, 10.0, Polarity::P0, 0).unwrap();
        let bc = BitChain::new(coord, Payload::from_text("  hello   world  "), None, vec![], None).unwrap();
        let result = conservator.repair(&bc).unwrap().unwrap();
        assert_eq!(result.repaired.payload.text.as_deref(), Some("hello world"));
    }

    #[test]
    fn already_canonical_record_needs_no_repair() {
        let conservator = Conservator::new([Realm::Data]);
        let coord = Coord::new(Realm::Data, 1, 50.0, Horizon::Genesis, 10.0, Polarity::P0, 0).unwrap();
        let bc = BitChain::new(coord, Payload::from_text("clean"), None, vec![], None).unwrap();
        let result = conservator.repair(&bc).unwrap().unwrap();
        assert_eq!(result.actions, vec![RepairAction::NoneNeeded]);
    }
}
