//! Store Error Types

use crate::scanner::types::{ScanId, ScanStatus};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("scan {id} not found")]
    NotFound { id: ScanId },

    /// A terminal transition was attempted on a scan that already ended
    #[error("scan {id} is already {status}")]
    AlreadyTerminal { id: ScanId, status: ScanStatus },

    #[error("{operation} failed for {path}: {cause}")]
    Io {
        operation: String,
        path: String,
        cause: String,
    },

    #[error("cannot encode or decode record: {message}")]
    Serialization { message: String },

    #[error("store state unavailable: {what}")]
    Poisoned { what: String },
}

impl StoreError {
    pub(crate) fn io(operation: &str, path: &std::path::Path, cause: std::io::Error) -> Self {
        StoreError::Io {
            operation: operation.to_string(),
            path: path.to_string_lossy().to_string(),
            cause: cause.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Serialization {
            message: error.to_string(),
        }
    }
}

impl crate::core::error_handling::ContextualError for StoreError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, StoreError::Io { .. })
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
