//! Seams between the pipeline and concrete sources

use std::sync::Arc;

use async_trait::async_trait;

use crate::collector::counters::ItemSender;
use crate::collector::error::{ClientError, CollectResult};
use crate::collector::types::{CollectedItem, Page, PageQuery, SourceKind};
use crate::core::retry::ErrorClass;
use crate::core::shutdown::ShutdownCoordinator;
use crate::scanner::types::{ScanId, ScanParams};

/// Client for one paginated provider API
#[async_trait]
pub trait SourceClient: Send + Sync + 'static {
    fn kind(&self) -> SourceKind;

    /// Fetch one listing page; `page_token` is `None` for the first page
    async fn list_page(&self, query: &PageQuery, page_token: Option<&str>)
        -> Result<Page, ClientError>;

    /// Fetch full metadata for an id returned as [`crate::collector::types::PageEntry::Detail`]
    async fn get_item_detail(&self, id: &str) -> Result<CollectedItem, ClientError>;

    /// Decide whether a failure is worth retrying
    fn classify(&self, error: &ClientError) -> ErrorClass;
}

/// Everything a collector needs for one scan
pub struct CollectContext {
    pub scan_id: ScanId,
    pub params: Arc<ScanParams>,
    pub items: ItemSender,
    pub shutdown: ShutdownCoordinator,
}

/// Per source-kind collection logic
///
/// `collect` must not return while any task it spawned can still send items:
/// returning drops the last [`ItemSender`] held by the collector, which is what
/// lets the sink observe the end of the stream.
#[async_trait]
pub trait Collector: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn collect(&self, ctx: CollectContext) -> CollectResult<()>;
}
