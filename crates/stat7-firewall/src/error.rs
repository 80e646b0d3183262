//! Errors for the admission firewall (C6/C7/C8).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FirewallError>;

#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("coord error: {0}")]
    Coord(#[from] stat7_core::Error),

    #[error("presence check failed: {0}")]
    PresenceFailed(String),

    #[error("authentication failed for requester {0:?}")]
    AuthFailed(String),

    #[error("policy denied requester {requester:?} for realm {realm}/{polarity}")]
    PolicyDenied {
        requester: String,
        realm: stat7_core::Realm,
        polarity: stat7_core::Polarity,
    },

    #[error("audit sink failed to persist audit record before returning: {0}")]
    AuditFailed(String),
}
