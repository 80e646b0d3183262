//! The semantic anchor graph: an embedding-backed deduplicating store with
//! heat/decay (spec component C4).

mod anchor;
mod error;
mod graph;

pub use anchor::{Anchor, AnchorId, CreateContext, StateThresholds, INITIAL_HEAT};
pub use error::{AnchorError, Result};
pub use graph::{AnchorGraph, DEFAULT_THETA_MERGE};
