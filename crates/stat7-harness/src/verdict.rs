//! The harness's output shape (spec §4.10): `Verdict{pass, metrics,
//! evidence}`, one per experiment run.

use std::collections::BTreeMap;

/// Outcome of one experiment run against a fixed `(seed, scale_parameters)`
/// pair.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub experiment: &'static str,
    pub pass: bool,
    /// Numeric measurements the property check was based on (collision
    /// counts, latency percentiles, score deltas, ...).
    pub metrics: BTreeMap<String, f64>,
    /// Human-readable notes explaining the pass/fail call.
    pub evidence: Vec<String>,
}

impl Verdict {
    pub fn new(experiment: &'static str) -> Self {
        Verdict {
            experiment,
            pass: true,
            metrics: BTreeMap::new(),
            evidence: Vec::new(),
        }
    }

    pub fn metric(mut self, key: &str, value: f64) -> Self {
        self.metrics.insert(key.to_string(), value);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.evidence.push(note.into());
        self
    }

    pub fn fail(mut self, reason: impl Into<String>) -> Self {
        self.pass = false;
        self.evidence.push(reason.into());
        self
    }
}

/// Scale parameters shared across experiments; individual experiments use
/// only the fields relevant to them (spec §4.10: `(seed, scale_parameters)
/// -> Verdict`).
#[derive(Debug, Clone, Copy)]
pub struct ScaleParameters {
    pub coord_population: usize,
    pub anchor_population: usize,
    pub query_count: usize,
    pub irrelevant_corpus_sizes: (usize, usize),
}

impl Default for ScaleParameters {
    fn default() -> Self {
        ScaleParameters {
            coord_population: 100_000,
            anchor_population: 10_000,
            query_count: 1_000,
            irrelevant_corpus_sizes: (5, 1000),
        }
    }
}

impl ScaleParameters {
    /// A much smaller profile for fast, deterministic unit tests that still
    /// exercise the same code paths as the full-scale run.
    pub fn small() -> Self {
        ScaleParameters {
            coord_population: 2_000,
            anchor_population: 50,
            query_count: 20,
            irrelevant_corpus_sizes: (5, 200),
        }
    }
}
