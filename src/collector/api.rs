//! Collector API
//!
//! Consolidated exports for callers outside the collector module.

pub use crate::collector::counters::{CounterSnapshot, ItemSender, ScanCounters};
pub use crate::collector::error::{ClientError, CollectError, CollectResult};
pub use crate::collector::filesystem::{FilesystemCollector, TreeWalker};
pub use crate::collector::paged::{PagedCollector, PagedStats};
pub use crate::collector::progress::ProgressReporter;
pub use crate::collector::rest::RestSourceClient;
pub use crate::collector::traits::{CollectContext, Collector, SourceClient};
pub use crate::collector::types::{
    CollectedItem, FileItem, MediaItem, MessageItem, Page, PageEntry, PageQuery, SourceKind,
    UNKNOWN_SIZE,
};
