//! Scanner Component
//!
//! Owns the lifecycle of a scan: record creation, per source-kind exclusion,
//! wiring a collector to the store through the bounded item channel, progress
//! reporting and the single terminal status transition.

pub mod controller;
pub mod error;
pub mod locks;
pub mod types;

pub mod api;

#[cfg(test)]
mod tests;
