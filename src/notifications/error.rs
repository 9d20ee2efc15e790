//! Error types for the progress hub

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The registry lock was poisoned by a panicking holder
    #[error("progress hub registry unavailable: {what}")]
    Poisoned { what: String },
}

impl crate::core::error_handling::ContextualError for HubError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}

pub type HubResult<T> = Result<T, HubError>;
