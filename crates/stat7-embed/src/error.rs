//! Errors for the embedding provider layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbedError>;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider timed out after {0} attempt(s)")]
    Timeout(u32),

    #[error("embedding provider returned a vector of dimension {got}, expected {expected}")]
    DimensionMismatch { got: usize, expected: usize },

    #[error("remote embedding provider error: {0}")]
    Remote(String),

    #[error("cannot embed empty text")]
    EmptyInput,
}
