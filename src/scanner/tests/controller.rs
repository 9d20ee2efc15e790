//! Tests for ScanController

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::collector::error::{CollectError, CollectResult};
use crate::collector::filesystem::FilesystemCollector;
use crate::collector::paged::PagedCollector;
use crate::collector::tests::scripted::{media, throttled, unauthorized, ScriptedClient};
use crate::collector::traits::{CollectContext, Collector};
use crate::collector::types::SourceKind;
use crate::core::config::PipelineConfig;
use crate::core::rate_limit::RateLimiter;
use crate::core::retry::RetryPolicy;
use crate::notifications::api::{Progress, ProgressHub, ProgressSubscriber, WILDCARD_KEY};
use crate::scanner::controller::ScanController;
use crate::scanner::error::ScanError;
use crate::scanner::types::{ScanId, ScanParams, ScanStatus};
use crate::store::api::{MemoryStore, Store};

fn test_config() -> PipelineConfig {
    PipelineConfig {
        progress_interval_ms: 10,
        ..PipelineConfig::default()
    }
}

fn paged(client: ScriptedClient) -> Arc<dyn Collector> {
    Arc::new(
        PagedCollector::new(Arc::new(client), Arc::new(RateLimiter::new(10_000.0, 1_000)))
            .with_policies(
                RetryPolicy::new(3, Duration::from_millis(5)),
                RetryPolicy::new(5, Duration::from_millis(5)),
            ),
    )
}

async fn drain(subscriber: &ProgressSubscriber) -> Vec<Progress> {
    let mut seen = Vec::new();
    while let Ok(Some(progress)) =
        tokio::time::timeout(Duration::from_secs(5), subscriber.recv()).await
    {
        seen.push(progress);
    }
    seen
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_pages_with_one_retry_complete_with_six_items() {
    let client = ScriptedClient::new(SourceKind::PagedMediaLike)
        .items_page(vec![media("a"), media("b"), media("c")])
        .items_page(vec![media("d"), media("e"), media("f")])
        .fail_page(1, vec![throttled()]);
    let store = Arc::new(MemoryStore::new());
    let hub = ProgressHub::default();
    let controller = ScanController::builder(store.clone(), hub.clone())
        .config(test_config())
        .collector(paged(client))
        .build();

    let subscriber = hub.get_subscriber("client-a").unwrap();
    let id = controller
        .start_scan(SourceKind::PagedMediaLike, ScanParams::new("client-a"))
        .await
        .unwrap();

    assert_eq!(controller.await_scan(id).await, Some(ScanStatus::Completed));
    assert_eq!(store.list_items(id).await.unwrap().len(), 6);
    let scan = store.get_scan(id).await.unwrap();
    assert_eq!(scan.status, ScanStatus::Completed);
    assert!(scan.started_at.is_some());
    assert!(scan.error_message.is_none());

    // The key subscription ends once the scan's publisher closes
    let progress = drain(&subscriber).await;
    assert!(!progress.is_empty());
    assert!(progress
        .windows(2)
        .all(|w| w[0].processed_count <= w[1].processed_count));
    let last = progress.last().unwrap();
    assert_eq!(last.processed_count, 6);
    assert_eq!(last.completion_pct, 100.0);
    assert_eq!(last.scan_id, id);
    assert!(!hub.has_subscriber("client-a").unwrap());
}

#[tokio::test]
async fn test_fatal_page_error_marks_failed() {
    let client = ScriptedClient::new(SourceKind::PagedMediaLike)
        .items_page(vec![media("a")])
        .items_page(vec![media("b")])
        .fail_page(1, vec![unauthorized()]);
    let store = Arc::new(MemoryStore::new());
    let controller = ScanController::builder(store.clone(), ProgressHub::default())
        .config(test_config())
        .collector(paged(client))
        .build();

    let id = controller
        .start_scan(SourceKind::PagedMediaLike, ScanParams::new("k"))
        .await
        .unwrap();
    assert_eq!(controller.await_scan(id).await, Some(ScanStatus::Failed));

    let scan = store.get_scan(id).await.unwrap();
    assert_eq!(scan.status, ScanStatus::Failed);
    assert!(scan.error_message.unwrap().contains("401"));
    // Items collected before the failure are still persisted
    assert_eq!(store.list_items(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unsupported_kind_is_rejected_before_creating_a_scan() {
    let store = Arc::new(MemoryStore::new());
    let controller = ScanController::builder(store.clone(), ProgressHub::default()).build();

    let result = controller
        .start_scan(SourceKind::PagedDriveLike, ScanParams::new("k"))
        .await;
    assert_eq!(
        result,
        Err(ScanError::UnsupportedSource {
            kind: SourceKind::PagedDriveLike
        })
    );
    assert!(store.get_scan(ScanId(1)).await.is_err());
}

#[tokio::test]
async fn test_filesystem_scan_requires_root() {
    let controller = ScanController::builder(Arc::new(MemoryStore::new()), ProgressHub::default())
        .collector(Arc::new(FilesystemCollector::new()))
        .build();
    let result = controller
        .start_scan(SourceKind::Filesystem, ScanParams::new("k"))
        .await;
    assert!(matches!(result, Err(ScanError::InvalidParams { .. })));
}

#[tokio::test]
async fn test_filesystem_scan_persists_tree() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("docs")).unwrap();
    std::fs::write(dir.path().join("docs/readme.md"), b"# notes").unwrap();
    std::fs::write(dir.path().join("todo.txt"), b"buy milk").unwrap();

    let store = Arc::new(MemoryStore::new());
    let controller = ScanController::builder(store.clone(), ProgressHub::default())
        .config(test_config())
        .collector(Arc::new(FilesystemCollector::new()))
        .build();
    let id = controller
        .start_scan(
            SourceKind::Filesystem,
            ScanParams::new("local").with_root(dir.path()),
        )
        .await
        .unwrap();

    assert_eq!(controller.await_scan(id).await, Some(ScanStatus::Completed));
    // two files, docs/ and the root
    assert_eq!(store.list_items(id).await.unwrap().len(), 4);
    assert_eq!(controller.counters(SourceKind::Filesystem).processed, 4);
}

/// Records the time window of each collection
struct WindowCollector {
    kind: SourceKind,
    windows: Arc<std::sync::Mutex<Vec<(tokio::time::Instant, tokio::time::Instant)>>>,
}

#[async_trait]
impl Collector for WindowCollector {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn collect(&self, ctx: CollectContext) -> CollectResult<()> {
        let start = tokio::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(40)).await;
        ctx.items.send(crate::collector::tests::scripted::media("x")).await?;
        let end = tokio::time::Instant::now();
        self.windows.lock().unwrap().push((start, end));
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_kind_collection_windows_do_not_overlap() {
    let windows = Arc::new(std::sync::Mutex::new(Vec::new()));
    let controller = ScanController::builder(Arc::new(MemoryStore::new()), ProgressHub::default())
        .config(test_config())
        .collector(Arc::new(WindowCollector {
            kind: SourceKind::PagedDriveLike,
            windows: Arc::clone(&windows),
        }))
        .build();

    let mut ids = Vec::new();
    for n in 0..4 {
        let id = controller
            .start_scan(
                SourceKind::PagedDriveLike,
                ScanParams::new(format!("client-{}", n)),
            )
            .await
            .unwrap();
        ids.push(id);
    }
    for id in ids {
        assert_eq!(controller.await_scan(id).await, Some(ScanStatus::Completed));
    }

    let mut windows = windows.lock().unwrap().clone();
    assert_eq!(windows.len(), 4);
    windows.sort_by_key(|(start, _)| *start);
    for pair in windows.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "collection windows overlap");
    }
}

/// Waits until shutdown, then reports the cancellation it observed
struct StuckCollector;

#[async_trait]
impl Collector for StuckCollector {
    fn kind(&self) -> SourceKind {
        SourceKind::PagedMessageLike
    }

    async fn collect(&self, ctx: CollectContext) -> CollectResult<()> {
        ctx.shutdown.cancelled().await;
        Err(CollectError::Cancelled)
    }
}

#[tokio::test]
async fn test_shutdown_fails_running_and_waiting_scans() {
    let store = Arc::new(MemoryStore::new());
    let controller = ScanController::builder(store.clone(), ProgressHub::default())
        .config(test_config())
        .collector(Arc::new(StuckCollector))
        .build();

    let running = controller
        .start_scan(SourceKind::PagedMessageLike, ScanParams::new("a"))
        .await
        .unwrap();
    let waiting = controller
        .start_scan(SourceKind::PagedMessageLike, ScanParams::new("b"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    controller.shutdown();
    assert_eq!(controller.await_scan(running).await, Some(ScanStatus::Failed));
    assert_eq!(controller.await_scan(waiting).await, Some(ScanStatus::Failed));
    assert_eq!(
        store.get_scan(running).await.unwrap().error_message.as_deref(),
        Some("scan cancelled")
    );

    let refused = controller
        .start_scan(SourceKind::PagedMessageLike, ScanParams::new("c"))
        .await;
    assert_eq!(refused, Err(ScanError::ShuttingDown));
}

#[tokio::test]
async fn test_await_unknown_scan() {
    let controller =
        ScanController::builder(Arc::new(MemoryStore::new()), ProgressHub::default()).build();
    assert_eq!(controller.await_scan(ScanId(42)).await, None);
}

/// Emits one item per tick for `ticks` ticks, then succeeds
struct SlowCollector {
    kind: SourceKind,
    ticks: u32,
}

#[async_trait]
impl Collector for SlowCollector {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn collect(&self, ctx: CollectContext) -> CollectResult<()> {
        for n in 0..self.ticks {
            tokio::time::sleep(Duration::from_millis(10)).await;
            ctx.items
                .send(media(&format!("slow-{}", n)))
                .await?;
        }
        Ok(())
    }
}

fn chatty_config() -> PipelineConfig {
    let mut config = PipelineConfig {
        progress_interval_ms: 1,
        ..PipelineConfig::default()
    };
    config.hub.subscriber_capacity = 1;
    config.hub.publisher_capacity = 1;
    config
}

async fn settles(controller: &ScanController, id: ScanId) -> Option<ScanStatus> {
    tokio::time::timeout(Duration::from_secs(5), controller.await_scan(id))
        .await
        .expect("scan did not settle")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscriber_dropped_mid_scan_does_not_block_the_scan() {
    let store = Arc::new(MemoryStore::new());
    let hub = ProgressHub::new(&chatty_config().hub);
    let controller = ScanController::builder(store.clone(), hub.clone())
        .config(chatty_config())
        .collector(Arc::new(SlowCollector {
            kind: SourceKind::PagedMediaLike,
            ticks: 30,
        }))
        .build();

    let subscriber = hub.get_subscriber("k").unwrap();
    let first = controller
        .start_scan(SourceKind::PagedMediaLike, ScanParams::new("k"))
        .await
        .unwrap();
    let second = controller
        .start_scan(SourceKind::PagedMediaLike, ScanParams::new("k"))
        .await
        .unwrap();

    // Read one snapshot, then disconnect while the scan is still collecting
    assert!(subscriber.recv().await.is_some());
    drop(subscriber);
    assert!(!hub.has_subscriber("k").unwrap());

    assert_eq!(settles(&controller, first).await, Some(ScanStatus::Completed));
    assert_eq!(settles(&controller, second).await, Some(ScanStatus::Completed));
    assert_eq!(store.list_items(first).await.unwrap().len(), 30);
    assert_eq!(store.list_items(second).await.unwrap().len(), 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscriber_that_never_reads_does_not_hold_the_lock() {
    let store = Arc::new(MemoryStore::new());
    let hub = ProgressHub::new(&chatty_config().hub);
    let controller = ScanController::builder(store.clone(), hub.clone())
        .config(chatty_config())
        .collector(Arc::new(SlowCollector {
            kind: SourceKind::PagedDriveLike,
            ticks: 10,
        }))
        .collector(Arc::new(SlowCollector {
            kind: SourceKind::PagedMessageLike,
            ticks: 10,
        }))
        .build();

    let _stalled_key = hub.get_subscriber("drive-client").unwrap();
    let _stalled_all = hub.get_subscriber(WILDCARD_KEY).unwrap();

    let mut ids = Vec::new();
    for (kind, key) in [
        (SourceKind::PagedDriveLike, "drive-client"),
        (SourceKind::PagedDriveLike, "drive-client"),
        (SourceKind::PagedMessageLike, "mail-client"),
    ] {
        ids.push(controller.start_scan(kind, ScanParams::new(key)).await.unwrap());
    }
    for id in ids {
        assert_eq!(settles(&controller, id).await, Some(ScanStatus::Completed));
    }
}
