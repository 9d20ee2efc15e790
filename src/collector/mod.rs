//! Source collectors
//!
//! A collector turns one source kind into a stream of [`types::CollectedItem`]s
//! pushed into the scan's bounded item channel. The filesystem collector walks
//! a local tree on a blocking thread; the paginated collector drives a
//! [`traits::SourceClient`] page by page and fans out detail calls.

pub mod counters;
pub mod error;
pub mod filesystem;
pub mod paged;
pub mod progress;
pub mod rest;
pub mod traits;
pub mod types;

pub mod api;

#[cfg(test)]
pub(crate) mod tests;
