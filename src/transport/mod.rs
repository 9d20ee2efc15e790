//! Streaming transports for progress snapshots

pub mod sse;
