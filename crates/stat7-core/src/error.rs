//! Error types shared by the coordinate, address, and bit-chain layers.

use thiserror::Error;

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// STAT7 core error types.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// `realm` is not one of the finite enum tags.
    #[error("invalid coord: unknown realm tag {0:?}")]
    InvalidRealm(String),

    /// `horizon` is not one of the finite enum tags.
    #[error("invalid coord: unknown horizon tag {0:?}")]
    InvalidHorizon(String),

    /// `polarity` is not one of the finite enum tags.
    #[error("invalid coord: unknown polarity tag {0:?}")]
    InvalidPolarity(String),

    /// `adjacency` or `luminosity` fell outside [0, 100].
    #[error("invalid coord: {field} out of range [0, 100]: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    /// A float input was NaN or infinite.
    #[error("invalid coord: {field} is not finite: {value}")]
    NotFinite { field: &'static str, value: f64 },

    /// `put` received a payload whose content hash already exists under a
    /// different coordinate.
    #[error("duplicate content with different coord: id {0}")]
    DuplicateContentDifferentCoord(String),

    /// Serialization/deserialization error from the canonical encoder.
    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    /// Timestamp failed to parse or format as ISO-8601 UTC with millisecond
    /// precision.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
