//! VerDB Error - Unified Error Types
//!
//! Error handling for all VerDB operations. `StoreError` describes failures
//! raised by a document store; `VerdbError` is the taxonomy exposed by the
//! registry, versioning and job layers.
//!
//! Key Features:
//! - Store errors pass through the core unchanged
//! - User vs system error classification for the HTTP boundary
//! - Merging of a primary failure with a failed status restore
//!
//! @version 0.1.0
//! @author VerDB Development Team

use thiserror::Error;

// =============================================================================
// Store Errors
// =============================================================================

/// Errors raised by a document store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("duplicate key on index {index}: {key}")]
    DuplicateKey { index: String, key: String },

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// =============================================================================
// Core Errors
// =============================================================================

/// Unified error type for registry, versioning and job operations.
#[derive(Error, Debug)]
pub enum VerdbError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("job is busy: {0}")]
    Busy(String),

    #[error("too many running jobs (limit {0})")]
    TooManyJobs(usize),

    #[error("unknown job type: {0}")]
    UnknownType(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{primary}; restoring job status failed: {restore}")]
    StatusRestore {
        primary: Box<VerdbError>,
        restore: Box<VerdbError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for VerDB operations.
pub type Result<T> = std::result::Result<T, VerdbError>;

impl From<serde_json::Error> for VerdbError {
    fn from(err: serde_json::Error) -> Self {
        VerdbError::Serialization(err.to_string())
    }
}

// =============================================================================
// Error Classification
// =============================================================================

impl VerdbError {
    /// Returns true if the caller, not the system, is at fault.
    pub fn is_user_error(&self) -> bool {
        match self {
            VerdbError::Validation(_)
            | VerdbError::Duplicate(_)
            | VerdbError::NotFound(_)
            | VerdbError::Busy(_)
            | VerdbError::UnknownType(_)
            | VerdbError::Serialization(_) => true,
            VerdbError::Store(err) => matches!(
                err,
                StoreError::InvalidQuery(_) | StoreError::InvalidUpdate(_)
            ),
            _ => false,
        }
    }

    /// Combine a failed job run with a failed attempt to restore its status.
    ///
    /// A successful run whose restore failed reports only the restore error.
    pub fn merge_restore(primary: Option<VerdbError>, restore: VerdbError) -> Self {
        match primary {
            Some(primary) => VerdbError::StatusRestore {
                primary: Box::new(primary),
                restore: Box::new(restore),
            },
            None => restore,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_passes_through() {
        let err: VerdbError = StoreError::Backend("disk full".to_string()).into();
        assert_eq!(err.to_string(), "backend error: disk full");
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_user_error_classification() {
        assert!(VerdbError::Validation("x".into()).is_user_error());
        assert!(VerdbError::NotFound("x".into()).is_user_error());
        assert!(VerdbError::Store(StoreError::InvalidQuery("bad".into())).is_user_error());
        assert!(!VerdbError::TooManyJobs(4).is_user_error());
    }

    #[test]
    fn test_merge_restore() {
        let merged = VerdbError::merge_restore(
            Some(VerdbError::Store(StoreError::Backend("boom".into()))),
            VerdbError::Store(StoreError::NotFound("job".into())),
        );
        let text = merged.to_string();
        assert!(text.contains("boom"));
        assert!(text.contains("restoring job status failed"));

        let only_restore =
            VerdbError::merge_restore(None, VerdbError::NotFound("job".into()));
        assert!(matches!(only_restore, VerdbError::NotFound(_)));
    }
}
