//! Error taxonomy for the memory policy layer.

use sentinel_state::StorageError;

use crate::capabilities::CapabilityError;

/// Errors produced by memory operations.
///
/// Façade operations either succeed with a typed result or fail with one of
/// these kinds. Redaction failures never surface here; the disclosure guard
/// degrades to a placeholder instead.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("not found: {key}")]
    NotFound { key: String },

    #[error("constraint violation on {table}: duplicate id {id}")]
    ConstraintViolation { table: String, id: String },

    #[error("compaction failed: {0}")]
    CompactionFailed(String),

    #[error("{operation} exceeded its {budget_ms}ms budget")]
    TimeoutExceeded { operation: String, budget_ms: u64 },

    #[error("{task} gave up after {attempts} conflicting attempt(s)")]
    ConflictRetryExhausted { task: String, attempts: u32 },

    #[error("proving failed: {0}")]
    ProvingFailed(String),

    /// Logged by the disclosure guard before it falls back to the
    /// placeholder; never returned to callers.
    #[error("redaction failed: {0}")]
    RedactionFailed(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MemoryError {
    /// Short stable name of the error kind, used in logs and sync reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::ConstraintViolation { .. } => "constraint_violation",
            Self::CompactionFailed(_) => "compaction_failed",
            Self::TimeoutExceeded { .. } => "timeout_exceeded",
            Self::ConflictRetryExhausted { .. } => "conflict_retry_exhausted",
            Self::ProvingFailed(_) => "proving_failed",
            Self::RedactionFailed(_) => "redaction_failed",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Capability(_) => "capability",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<StorageError> for MemoryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { key } => MemoryError::NotFound { key },
            StorageError::ConstraintViolation { table, id } => {
                MemoryError::ConstraintViolation { table, id }
            }
            other => MemoryError::Storage(other),
        }
    }
}

/// Result type for memory operations.
pub type MemoryResult<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_not_found_keeps_kind() {
        let err: MemoryError = StorageError::NotFound {
            key: "agent:contract:0xABC".to_string(),
        }
        .into();
        assert!(matches!(err, MemoryError::NotFound { ref key } if key == "agent:contract:0xABC"));
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_storage_constraint_violation_keeps_kind() {
        let err: MemoryError = StorageError::ConstraintViolation {
            table: "known_exploits".to_string(),
            id: "e1".to_string(),
        }
        .into();
        assert!(matches!(err, MemoryError::ConstraintViolation { .. }));
    }

    #[test]
    fn test_other_storage_errors_are_wrapped() {
        let err: MemoryError = StorageError::Backend("down".to_string()).into();
        assert!(matches!(err, MemoryError::Storage(_)));
        assert!(err.to_string().contains("down"));
    }

    #[test]
    fn test_timeout_display() {
        let err = MemoryError::TimeoutExceeded {
            operation: "sync task refresh_threat_feeds".to_string(),
            budget_ms: 300,
        };
        assert!(err.to_string().contains("300ms"));
        assert_eq!(err.kind(), "timeout_exceeded");
    }
}
