//! Generic error handling utilities
//!
//! Every module error in the crate implements [`ContextualError`] so the binary
//! can decide whether to show the error text itself or a generic context line
//! with the details pushed down to debug level.

/// Trait for errors that distinguish operator-actionable failures from system ones
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)`; otherwise it returns `None`.
pub trait ContextualError: std::error::Error {
    /// True when the operator can fix the cause (bad config, missing root, unknown source)
    fn is_user_actionable(&self) -> bool;

    /// The message to show when the error is user-actionable
    fn user_message(&self) -> Option<&str>;
}

/// Log an error with a detail level matched to who can act on it
///
/// User-actionable errors log their own message at error level. System errors
/// log `operation_context` at error level. Both log the full error at debug.
pub fn log_error_with_context<E: ContextualError + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => {
            log::error!("FATAL: {}: {}", operation_context, user_msg)
        }
        _ => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
