//! Collector error types

use crate::core::rate_limit::RateLimitError;
use crate::core::retry::RetryError;

/// Failure reported by a provider API client
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// The provider answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        reason: Option<String>,
        message: String,
    },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("cannot decode provider response: {message}")]
    Decode { message: String },
}

impl ClientError {
    pub fn status(status: u16, reason: Option<&str>, message: impl Into<String>) -> Self {
        ClientError::Status {
            status,
            reason: reason.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Failure that ends a collection run
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollectError {
    #[error("invalid scan parameters: {message}")]
    InvalidParams { message: String },

    #[error("cannot read source: {message}")]
    Io { message: String },

    /// A listing page failed fatally or exhausted its retry budget
    #[error("page {page} failed: {message}")]
    PageFailed { page: usize, message: String },

    #[error("scan cancelled")]
    Cancelled,

    /// The downstream item channel closed before collection finished
    #[error("item channel closed")]
    ChannelClosed,

    #[error("collector task failed: {message}")]
    Panicked { message: String },
}

impl CollectError {
    pub(crate) fn from_page_retry(page: usize, error: RetryError<ClientError>) -> Self {
        match error {
            RetryError::RateLimit(RateLimitError::Cancelled) => CollectError::Cancelled,
            other => CollectError::PageFailed {
                page,
                message: other.to_string(),
            },
        }
    }
}

impl From<RateLimitError> for CollectError {
    fn from(error: RateLimitError) -> Self {
        match error {
            RateLimitError::Cancelled => CollectError::Cancelled,
            RateLimitError::Poisoned { message } => CollectError::Panicked { message },
        }
    }
}

impl crate::core::error_handling::ContextualError for CollectError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, CollectError::InvalidParams { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            CollectError::InvalidParams { message } => Some(message),
            _ => None,
        }
    }
}

impl crate::core::error_handling::ContextualError for ClientError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}

pub type CollectResult<T> = Result<T, CollectError>;
