//! Error types for the MNEMOS core library.

use thiserror::Error;

use crate::memory::ItemKind;
use crate::store::BlobKey;

/// Top-level error type for all MNEMOS operations.
#[derive(Error, Debug)]
pub enum MnemosError {
    /// No blob is stored under the given digest.
    #[error("Blob not found: {0}")]
    BlobNotFound(BlobKey),

    /// A file/directory collision under [`CollisionPolicy::Reject`](crate::tree::CollisionPolicy).
    #[error("Path collision at {path}: {existing} already occupies this segment")]
    PathCollision {
        /// Path prefix where the collision happened.
        path: String,
        /// What was found there ("file" or "directory").
        existing: &'static str,
    },

    /// A path with no usable segments.
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    /// A concept vector had the wrong number of dimensions.
    #[error("Concept vector {concept:?} has {actual} dimensions (expected {expected})")]
    DimensionMismatch {
        /// Concept name.
        concept: String,
        /// Configured dimensionality.
        expected: usize,
        /// Dimensionality supplied by the caller.
        actual: usize,
    },

    /// A memory item with the given ID was not found.
    #[error("{kind} not found: {id}")]
    ItemNotFound {
        /// Fact or episode.
        kind: ItemKind,
        /// Item ID.
        id: String,
    },

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The command service has shut down and can no longer accept commands.
    #[error("Memory service stopped")]
    ServiceStopped,

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for MnemosError {
    fn from(err: serde_json::Error) -> Self {
        MnemosError::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, MnemosError>;
