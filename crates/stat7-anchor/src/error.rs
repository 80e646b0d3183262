//! Errors for the semantic anchor graph.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnchorError>;

#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("embedding error: {0}")]
    Embed(#[from] stat7_embed::EmbedError),

    #[error("coord error: {0}")]
    Coord(#[from] stat7_core::Error),

    #[error("storage error: {0}")]
    Storage(#[from] stat7_store::StorageError),

    #[error("anchor not found: {0:?}")]
    NotFound(crate::AnchorId),
}
