//! Per-kind scan counters and the counting item sender

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::collector::error::{CollectError, CollectResult};
use crate::collector::types::CollectedItem;

/// Counters shared by the page loop, fan-out tasks and the progress reporter
///
/// One instance exists per source kind. The controller resets it after taking
/// the kind's lock, so only one scan writes to it at a time.
#[derive(Debug, Default)]
pub struct ScanCounters {
    processed: AtomicU64,
    active: AtomicU64,
    total_hint: AtomicU64,
}

/// Point-in-time copy of [`ScanCounters`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    pub processed: u64,
    pub active: u64,
    /// Zero when no estimate is known
    pub total_hint: u64,
}

impl ScanCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.processed.store(0, Ordering::SeqCst);
        self.active.store(0, Ordering::SeqCst);
        self.total_hint.store(0, Ordering::SeqCst);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    /// Raise the total estimate; estimates never shrink within a scan
    pub fn record_total_hint(&self, total: u64) {
        self.total_hint.fetch_max(total, Ordering::SeqCst);
    }

    /// Mark one fan-out task in flight until the returned guard drops
    pub fn track_active(self: &Arc<Self>) -> ActiveGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActiveGuard {
            counters: Arc::clone(self),
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            processed: self.processed.load(Ordering::SeqCst),
            active: self.active.load(Ordering::SeqCst),
            total_hint: self.total_hint.load(Ordering::SeqCst),
        }
    }
}

/// Decrements the active count on drop, including on task panic
pub struct ActiveGuard {
    counters: Arc<ScanCounters>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Producer side of the bounded item channel
///
/// Clones are handed to fan-out tasks. The channel closes when the last clone
/// drops, so it can only close after every potential sender has returned.
#[derive(Debug, Clone)]
pub struct ItemSender {
    sender: mpsc::Sender<CollectedItem>,
    counters: Arc<ScanCounters>,
}

impl ItemSender {
    pub fn new(sender: mpsc::Sender<CollectedItem>, counters: Arc<ScanCounters>) -> Self {
        Self { sender, counters }
    }

    /// Send one item, waiting while the channel is full
    pub async fn send(&self, item: CollectedItem) -> CollectResult<()> {
        self.sender
            .send(item)
            .await
            .map_err(|_| CollectError::ChannelClosed)?;
        self.counters.record_processed();
        Ok(())
    }

    /// Blocking variant for collectors running on a blocking thread
    pub fn blocking_send(&self, item: CollectedItem) -> CollectResult<()> {
        self.sender
            .blocking_send(item)
            .map_err(|_| CollectError::ChannelClosed)?;
        self.counters.record_processed();
        Ok(())
    }

    pub fn counters(&self) -> &Arc<ScanCounters> {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_guard_decrements_on_drop() {
        let counters = Arc::new(ScanCounters::new());
        let first = counters.track_active();
        let second = counters.track_active();
        assert_eq!(counters.snapshot().active, 2);
        drop(first);
        assert_eq!(counters.snapshot().active, 1);
        drop(second);
        assert_eq!(counters.snapshot().active, 0);
    }

    #[test]
    fn test_total_hint_only_grows_and_reset_clears() {
        let counters = ScanCounters::new();
        counters.record_total_hint(40);
        counters.record_total_hint(10);
        counters.record_processed();
        assert_eq!(
            counters.snapshot(),
            CounterSnapshot {
                processed: 1,
                active: 0,
                total_hint: 40
            }
        );
        counters.reset();
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
    }

    #[tokio::test]
    async fn test_send_counts_only_delivered_items() {
        let counters = Arc::new(ScanCounters::new());
        let (tx, rx) = mpsc::channel(1);
        let sender = ItemSender::new(tx, Arc::clone(&counters));
        let item = CollectedItem::Media(crate::collector::types::MediaItem {
            key: "m1".to_string(),
            name: "IMG_0001.jpg".to_string(),
            size: -1,
            modified: None,
            hash: None,
            mime_type: Some("image/jpeg".to_string()),
            width: None,
            height: None,
        });

        sender.send(item.clone()).await.unwrap();
        assert_eq!(counters.snapshot().processed, 1);

        drop(rx);
        assert_eq!(sender.send(item).await, Err(CollectError::ChannelClosed));
        assert_eq!(counters.snapshot().processed, 1);
    }
}
