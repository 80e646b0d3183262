//! Conflict detection for CONFLICT_AWARE retrieval (spec §4.5, §9 open
//! question: "treat the detector as a pluggable predicate").

use stat7_anchor::{Anchor, AnchorGraph};
use stat7_core::Polarity;

/// Polarities considered mutually incompatible when they co-occur at the
/// same coord-key (spec §9: "incompatible polarity"). `Inverted` is the
/// structural opposite of every charged polarity; `Neutral` never
/// conflicts.
fn polarities_incompatible(a: Polarity, b: Polarity) -> bool {
    match (a, b) {
        (Polarity::Neutral, _) | (_, Polarity::Neutral) => false,
        (Polarity::Inverted, other) | (other, Polarity::Inverted) => other != Polarity::Inverted,
        _ => false,
    }
}

/// `returns a list of reasons if the anchor contradicts the query context`
/// (spec §9). Implementations are pluggable; [`StructuralConflictDetector`]
/// is the default predicate this crate ships.
pub trait ConflictDetector: Send + Sync {
    fn conflicts(&self, graph: &AnchorGraph, candidate: &Anchor, query_context: &Anchor) -> Vec<String>;
}

/// Default detector (spec §4.5/§9): two anchors conflict if they share a
/// coord-key (same `realm`) with incompatible `polarity`, or if an explicit
/// conflict link has been recorded between them.
pub struct StructuralConflictDetector;

impl ConflictDetector for StructuralConflictDetector {
    fn conflicts(&self, graph: &AnchorGraph, candidate: &Anchor, query_context: &Anchor) -> Vec<String> {
        let mut reasons = Vec::new();

        if candidate.coord.realm == query_context.coord.realm
            && polarities_incompatible(candidate.coord.polarity, query_context.coord.polarity)
        {
            reasons.push(format!(
                "incompatible_polarity: {} vs {} in realm {}",
                candidate.coord.polarity, query_context.coord.polarity, candidate.coord.realm
            ));
        }

        if graph.has_conflict_link(candidate.anchor_id, query_context.anchor_id) {
            reasons.push("explicit_conflict_link".to_string());
        }

        reasons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stat7_core::Polarity;

    #[test]
    fn neutral_never_conflicts() {
        assert!(!polarities_incompatible(Polarity::Neutral, Polarity::Inverted));
        assert!(!polarities_incompatible(Polarity::P0, Polarity::Neutral));
    }

    #[test]
    fn inverted_conflicts_with_charged_polarity() {
        assert!(polarities_incompatible(Polarity::Inverted, Polarity::P0));
        assert!(polarities_incompatible(Polarity::P1, Polarity::Inverted));
    }

    #[test]
    fn inverted_does_not_conflict_with_inverted() {
        assert!(!polarities_incompatible(Polarity::Inverted, Polarity::Inverted));
    }
}
