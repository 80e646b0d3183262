//! Experiment harness (spec §4.10, C10): pure or async `(seed,
//! scale_parameters) -> Verdict` functions, one per testable property from
//! spec §8 (EXP-01..EXP-10).
//!
//! Each experiment is self-contained: it builds whatever coords, anchors, or
//! admission pipelines it needs from the lower-numbered crates, runs the
//! property check, and returns a [`Verdict`] carrying the metrics and
//! evidence the pass/fail call was based on. Nothing here depends on a
//! running `stat7d` instance.

mod experiments;
mod verdict;

pub use experiments::{
    exp01_unique_addresses, exp02_retrieval_latency, exp03_dimension_necessary,
    exp04_deterministic_address, exp05_wfc_depth_sensitivity, exp06_wfc_determinism,
    exp07_merge_idempotent, exp08_journey_complete, exp09_replay, exp10_scale_invariance,
};
pub use verdict::{ScaleParameters, Verdict};
