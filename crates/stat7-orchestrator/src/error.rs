//! Errors for the integration orchestrator.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("storage error: {0}")]
    Storage(#[from] stat7_store::StorageError),

    #[error("coord error: {0}")]
    Coord(#[from] stat7_core::Error),

    /// The audit-before-return check failed to persist (spec §4.7: "so
    /// failures to log become admission failures"). This is an
    /// `InternalInvariant` per spec §7: fatal, halts the admission, raises
    /// an operator alert, but never corrupts persisted state.
    #[error("audit log write failed, halting admission: {0}")]
    AuditInvariantViolated(String),

    /// A deadline (spec §5 "every external call has a deadline") was
    /// exceeded during a persistence write.
    #[error("admission timed out after {0}ms")]
    Timeout(u64),

    /// The admission was cancelled mid-flight (spec §5).
    #[error("admission cancelled")]
    Cancelled,
}
