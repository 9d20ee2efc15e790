//! Store API

pub use crate::store::error::{StoreError, StoreResult};
pub use crate::store::jsonl::JsonLinesStore;
pub use crate::store::memory::MemoryStore;
pub use crate::store::traits::{DrainStats, Store};
