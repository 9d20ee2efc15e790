//! Persistence seam used by the scan controller

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::collector::types::{CollectedItem, SourceKind};
use crate::scanner::types::{Scan, ScanId, ScanParams, ScanStatus};
use crate::store::error::{StoreError, StoreResult};

/// Outcome of draining one scan's item channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub saved: u64,
    pub failed: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Create a `Running` scan record and return its id
    async fn create_scan(&self, kind: SourceKind) -> StoreResult<ScanId>;

    async fn save_scan_metadata(&self, id: ScanId, params: &ScanParams) -> StoreResult<()>;

    /// Record that the scan acquired its source lock
    async fn mark_started(&self, id: ScanId) -> StoreResult<()>;

    async fn mark_completed(&self, id: ScanId) -> StoreResult<()>;

    async fn mark_failed(&self, id: ScanId, message: &str) -> StoreResult<()>;

    async fn save_item(&self, id: ScanId, item: &CollectedItem) -> StoreResult<()>;

    async fn get_scan(&self, id: ScanId) -> StoreResult<Scan>;

    async fn list_items(&self, id: ScanId) -> StoreResult<Vec<CollectedItem>>;

    /// Drain the item channel until it closes, persisting each item
    ///
    /// A failed write is logged and counted; draining continues.
    async fn persist_stream(
        &self,
        id: ScanId,
        mut items: mpsc::Receiver<CollectedItem>,
    ) -> DrainStats {
        let mut stats = DrainStats::default();
        while let Some(item) = items.recv().await {
            match self.save_item(id, &item).await {
                Ok(()) => stats.saved += 1,
                Err(e) => {
                    stats.failed += 1;
                    log::warn!("Scan {}: cannot persist item {}: {}", id, item.key(), e);
                }
            }
        }
        log::debug!(
            "Scan {}: item channel closed, {} saved, {} failed",
            id,
            stats.saved,
            stats.failed
        );
        stats
    }
}

/// Apply a terminal transition to a scan record
///
/// Only a `Running` scan can end; anything else is `AlreadyTerminal`.
pub(crate) fn finish_scan(
    scan: &mut Scan,
    status: ScanStatus,
    error_message: Option<&str>,
) -> StoreResult<()> {
    if scan.status.is_terminal() {
        return Err(StoreError::AlreadyTerminal {
            id: scan.id,
            status: scan.status,
        });
    }
    scan.status = status;
    scan.ended_at = Some(Utc::now());
    scan.error_message = error_message.map(str::to_string);
    Ok(())
}
