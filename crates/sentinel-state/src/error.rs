//! Error types for sentinel-state

use thiserror::Error;

use crate::storage_traits::Version;

/// Errors returned by the backing stores.
///
/// Adapters never retry internally; every variant is surfaced to the caller
/// as-is.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Read miss on a key-value or relational lookup
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// Unique constraint rejected an insert
    #[error("constraint violation on {table}: duplicate id {id}")]
    ConstraintViolation { table: String, id: String },

    /// Compare-and-swap observed a different version than expected
    #[error("version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: Version,
        actual: Version,
    },

    /// Referenced table does not exist
    #[error("unknown table: {table}")]
    UnknownTable { table: String },

    /// Statement is malformed or outside the supported dialect
    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    /// Vector does not match the dimension of stored embeddings
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Backend unavailable or failed
    #[error("backend failure: {0}")]
    Backend(String),

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// True for conflicts a caller may resolve by re-reading and retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::VersionConflict { .. })
    }
}
