// Internal modules - all access should go through api module
pub(crate) mod error;
pub(crate) mod event;
pub(crate) mod hub;

// Public API module - the only public interface for the progress hub
pub mod api;
