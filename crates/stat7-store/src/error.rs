//! Storage errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate content with different coord: id {0}")]
    DuplicateContentDifferentCoord(String),
}
