//! Scanner Error Types

use crate::collector::types::SourceKind;
use crate::notifications::api::HubError;
use crate::store::api::StoreError;

/// Failure to start a scan; failures after start become the scan's status
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanError {
    /// No collector is registered for the requested kind
    #[error("unsupported source kind: {kind}")]
    UnsupportedSource { kind: SourceKind },

    #[error("invalid scan parameters: {message}")]
    InvalidParams { message: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("progress hub error: {0}")]
    Hub(#[from] HubError),

    /// The controller is shutting down and accepts no new scans
    #[error("scan controller is shutting down")]
    ShuttingDown,
}

impl crate::core::error_handling::ContextualError for ScanError {
    fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            ScanError::UnsupportedSource { .. } | ScanError::InvalidParams { .. }
        )
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            ScanError::InvalidParams { message } => Some(message),
            ScanError::UnsupportedSource { .. } => {
                Some("no collector is configured for this source kind")
            }
            _ => None,
        }
    }
}

pub type ScanResult<T> = Result<T, ScanError>;
