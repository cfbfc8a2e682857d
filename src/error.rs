//! Structured error types for store and reconciliation operations.

use crate::types::TaskId;
use serde::Serialize;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Structural errors
    DanglingParent,

    // Not found errors
    TaskNotFound,

    // Validation errors
    InvalidRecord,
    InvalidQuery,
    InvalidPattern,

    // Internal errors
    IoError,
    SerializationError,
}

/// Errors surfaced by the library.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A parsed line names a parent line that is not part of the same batch.
    #[error("{file}:{line}: parent line {parent_line} is not in the parsed batch")]
    DanglingParent {
        file: String,
        line: usize,
        parent_line: usize,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid record field '{field}': {reason}")]
    InvalidRecord { field: String, reason: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid token pattern: {0}")]
    Pattern(#[from] regex_lite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl SyncError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::DanglingParent { .. } => ErrorCode::DanglingParent,
            SyncError::TaskNotFound(_) => ErrorCode::TaskNotFound,
            SyncError::InvalidRecord { .. } => ErrorCode::InvalidRecord,
            SyncError::InvalidQuery(_) => ErrorCode::InvalidQuery,
            SyncError::Pattern(_) => ErrorCode::InvalidPattern,
            SyncError::Io(_) => ErrorCode::IoError,
            SyncError::Json(_) | SyncError::Yaml(_) => ErrorCode::SerializationError,
        }
    }

    pub fn invalid_record(field: &str, reason: impl Into<String>) -> Self {
        SyncError::InvalidRecord {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors that abort a single file's reconciliation only.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SyncError::DanglingParent { .. } | SyncError::InvalidRecord { .. }
        )
    }
}

/// Result type for library operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = SyncError::DanglingParent {
            file: "a.md".to_string(),
            line: 3,
            parent_line: 1,
        };
        assert_eq!(err.code(), ErrorCode::DanglingParent);
        assert!(err.is_structural());
        assert_eq!(
            err.to_string(),
            "a.md:3: parent line 1 is not in the parsed batch"
        );

        assert_eq!(SyncError::TaskNotFound(9).code(), ErrorCode::TaskNotFound);
        assert!(!SyncError::TaskNotFound(9).is_structural());
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::DanglingParent).unwrap();
        assert_eq!(json, "\"DANGLING_PARENT\"");
    }
}
