//! The six-mode retrieval engine: query planner, scoring, ranking, and
//! query cache (spec component C5).

mod cache;
mod conflict;
mod engine;
mod error;
mod query;
mod result;
mod scoring;

pub use cache::{cache_key, QueryCache, DEFAULT_CACHE_TTL_SECONDS};
pub use conflict::{ConflictDetector, StructuralConflictDetector};
pub use engine::{EngineMetrics, RetrievalEngine, DEFAULT_THETA_EDGE};
pub use error::{Result, RetrievalError};
pub use query::{CoordFilter, QueryMode, RetrievalQuery};
pub use result::{AnchorResult, AssemblyMetadata, ContextAssembly};
pub use scoring::{score_candidates, score_result_set, ScoredCandidate, ScoringWeights};
