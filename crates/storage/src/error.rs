//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("manifest encoding error: {0}")]
    Manifest(#[from] serde_json::Error),

    /// The artifact alone is larger than the byte budget. Retrying cannot help.
    #[error("artifact of {size} bytes exceeds the {max_bytes} byte storage budget")]
    CapacityExceeded { size: u64, max_bytes: u64 },

    /// Eviction could not make room under the current budgets.
    #[error("preview storage is full")]
    TemporarilyFull,

    /// The caller cancelled before the operation committed.
    #[error("operation aborted")]
    Aborted,

    #[error("manifest executor is not running")]
    Closed,

    #[error("manifest job failed before replying")]
    JobFailed,
}

impl StorageError {
    /// True for faults of the underlying disk or manifest, as opposed to
    /// outcomes of admission control or cancellation.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Manifest(_)
                | Self::InvalidPath(_)
                | Self::Closed
                | Self::JobFailed
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_outcomes_are_not_faults() {
        assert!(!StorageError::TemporarilyFull.is_fault());
        assert!(!StorageError::Aborted.is_fault());
        assert!(!StorageError::NotFound("x".into()).is_fault());
        assert!(
            !StorageError::CapacityExceeded {
                size: 2,
                max_bytes: 1
            }
            .is_fault()
        );
    }

    #[test]
    fn test_disk_and_executor_errors_are_faults() {
        assert!(StorageError::Closed.is_fault());
        assert!(StorageError::JobFailed.is_fault());
        assert!(StorageError::InvalidPath("/".into()).is_fault());
        assert!(StorageError::Io(std::io::Error::other("disk")).is_fault());
    }
}
