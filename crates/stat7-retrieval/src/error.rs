//! Errors for the retrieval engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("retrieval timed out after {0}ms")]
    Timeout(u64),

    #[error("retrieval cancelled")]
    Cancelled,

    #[error("anchor graph error: {0}")]
    Anchor(#[from] stat7_anchor::AnchorError),

    #[error("embedding error: {0}")]
    Embed(#[from] stat7_embed::EmbedError),

    #[error("storage error: {0}")]
    Storage(#[from] stat7_store::StorageError),
}
