//! Relevance scoring (spec §4.5), grounded in `routerd::scoring::Scorer`'s
//! weighted multi-factor pattern — generalized from provider ranking to
//! anchor ranking.

/// Weighted components of the SEMANTIC_SIMILARITY relevance formula
/// (spec §4.5). Other modes reuse the same weights unless noted at the
/// call site.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub result_quality: f64,
    pub semantic_coherence: f64,
    pub stat7_entanglement: f64,
    pub focus_bonus: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            result_quality: 0.5,
            semantic_coherence: 0.3,
            stat7_entanglement: 0.1,
            focus_bonus: 0.1,
        }
    }
}

/// One scored candidate going into [`score_result_set`]: its cosine to the
/// query and its `adjacency` field (spec §4.5's `stat7_entanglement` input).
#[derive(Debug, Clone, Copy)]
pub struct ScoredCandidate {
    pub cosine: f32,
    pub adjacency: f64,
    pub realm_key: u8,
}

/// `relevance = 0.5*result_quality + 0.3*semantic_coherence +
/// 0.1*stat7_entanglement + 0.1*focus_bonus` (spec §4.5).
///
/// Computed over the whole returned set at once because `semantic_coherence`
/// (stddev of cosines) and `focus_bonus` (distinct-realm count) are
/// properties of the *set*, not of any one candidate — this is what makes
/// the score scale-invariant (P-SCALE, spec §8): growing the irrelevant
/// corpus does not change the composition of an already-selected top-k set.
pub fn score_result_set(candidates: &[ScoredCandidate], weights: &ScoringWeights) -> f64 {
    if candidates.is_empty() {
        return 0.0;
    }
    let n = candidates.len() as f64;
    let result_quality = candidates.iter().map(|c| c.cosine as f64).sum::<f64>() / n;

    let variance = candidates
        .iter()
        .map(|c| (c.cosine as f64 - result_quality).powi(2))
        .sum::<f64>()
        / n;
    let semantic_coherence = (1.0 - variance.sqrt()).max(0.0);

    let stat7_entanglement = candidates.iter().map(|c| c.adjacency).sum::<f64>() / n / 100.0;

    let distinct_realms = candidates
        .iter()
        .map(|c| c.realm_key)
        .collect::<std::collections::HashSet<_>>()
        .len() as f64;
    let focus_bonus = if result_quality > 0.8 {
        1.0 / (1.0 + distinct_realms * 0.01)
    } else {
        0.5 + 0.5 * result_quality
    };

    weights.result_quality * result_quality
        + weights.semantic_coherence * semantic_coherence
        + weights.stat7_entanglement * stat7_entanglement
        + weights.focus_bonus * focus_bonus
}

/// Per-item relevance scores for a ranked result set (spec §3
/// `relevance_score` on each entry): each item's own cosine stands in for
/// `result_quality`, while `semantic_coherence`'s stddev term and
/// `focus_bonus`'s distinct-realm term are shared set-level statistics
/// (spec §4.5 defines them over "the returned set"), so every item in one
/// assembly shares those two components and differs only in its own cosine
/// and adjacency.
pub fn score_candidates(candidates: &[ScoredCandidate], weights: &ScoringWeights) -> Vec<f64> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let n = candidates.len() as f64;
    let mean_cosine = candidates.iter().map(|c| c.cosine as f64).sum::<f64>() / n;
    let variance = candidates
        .iter()
        .map(|c| (c.cosine as f64 - mean_cosine).powi(2))
        .sum::<f64>()
        / n;
    let semantic_coherence = (1.0 - variance.sqrt()).max(0.0);
    let distinct_realms = candidates
        .iter()
        .map(|c| c.realm_key)
        .collect::<std::collections::HashSet<_>>()
        .len() as f64;
    let focus_bonus = if mean_cosine > 0.8 {
        1.0 / (1.0 + distinct_realms * 0.01)
    } else {
        0.5 + 0.5 * mean_cosine
    };

    candidates
        .iter()
        .map(|c| {
            weights.result_quality * c.cosine as f64
                + weights.semantic_coherence * semantic_coherence
                + weights.stat7_entanglement * (c.adjacency / 100.0)
                + weights.focus_bonus * focus_bonus
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(cosine: f32, adjacency: f64) -> ScoredCandidate {
        ScoredCandidate { cosine, adjacency, realm_key: 0 }
    }

    #[test]
    fn empty_set_scores_zero() {
        assert_eq!(score_result_set(&[], &ScoringWeights::default()), 0.0);
    }

    #[test]
    fn identical_cosines_have_perfect_coherence() {
        let set = vec![candidate(0.9, 50.0), candidate(0.9, 50.0)];
        let score = score_result_set(&set, &ScoringWeights::default());
        assert!(score > 0.0);
    }

    #[test]
    fn higher_quality_scores_higher_all_else_equal() {
        let weak = vec![candidate(0.5, 50.0), candidate(0.5, 50.0)];
        let strong = vec![candidate(0.95, 50.0), candidate(0.95, 50.0)];
        let weights = ScoringWeights::default();
        assert!(score_result_set(&strong, &weights) > score_result_set(&weak, &weights));
    }

    #[test]
    fn score_candidates_ranks_higher_cosine_first() {
        let set = vec![candidate(0.4, 10.0), candidate(0.95, 10.0)];
        let scores = score_candidates(&set, &ScoringWeights::default());
        assert!(scores[1] > scores[0]);
    }

    #[test]
    fn score_is_approximately_scale_invariant() {
        // spec §8 P-SCALE: a fixed relevant corpus scored alongside a
        // growing but identically-scored set of "irrelevant" candidates
        // (same cosine distribution) should not drift by more than 5%.
        let weights = ScoringWeights::default();
        let small: Vec<_> = (0..5).map(|_| candidate(0.85, 40.0)).collect();
        let large: Vec<_> = (0..1000).map(|_| candidate(0.85, 40.0)).collect();
        let s_small = score_result_set(&small, &weights);
        let s_large = score_result_set(&large, &weights);
        assert!((s_small - s_large).abs() / s_small <= 0.05);
    }
}
