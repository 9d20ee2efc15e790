//! Scan and item persistence
//!
//! The controller talks to persistence only through the [`traits::Store`]
//! trait. Two implementations ship with the crate: an in-memory store used by
//! tests and ad-hoc runs, and a JSON-lines store that writes one file per scan
//! record and one append-only log per scan's items.

pub mod error;
pub mod jsonl;
pub mod memory;
pub mod traits;

pub mod api;

#[cfg(test)]
mod tests;
