//! Tests for the paginated / fan-out collector

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::collector::error::CollectError;
use crate::collector::paged::PagedCollector;
use crate::collector::tests::scripted::{
    media, run_collector, run_collector_with_shutdown, throttled, unauthorized, ScriptedClient,
};
use crate::collector::types::SourceKind;
use crate::core::rate_limit::RateLimiter;
use crate::core::retry::RetryPolicy;
use crate::core::shutdown::ShutdownCoordinator;
use crate::scanner::types::ScanParams;

fn fast_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(10_000.0, 1_000))
}

fn collector(client: &Arc<ScriptedClient>, page_attempts: usize, item_attempts: usize) -> PagedCollector<ScriptedClient> {
    PagedCollector::new(Arc::clone(client), fast_limiter()).with_policies(
        RetryPolicy::new(page_attempts, Duration::from_millis(1)),
        RetryPolicy::new(item_attempts, Duration::from_millis(1)),
    )
}

fn ids(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|n| format!("{}{}", prefix, n)).collect()
}

fn as_strs(ids: &[String]) -> Vec<&str> {
    ids.iter().map(String::as_str).collect()
}

#[tokio::test]
async fn test_direct_items_keep_page_order() {
    let client = Arc::new(
        ScriptedClient::new(SourceKind::PagedMediaLike)
            .items_page(vec![media("p1"), media("p2"), media("p3")])
            .items_page(vec![media("p4"), media("p5")]),
    );
    let collector = collector(&client, 3, 5);

    let (result, items, counters) = run_collector(&collector, ScanParams::new("k"), 2).await;
    result.unwrap();

    let keys: Vec<&str> = items.iter().map(|item| item.key()).collect();
    assert_eq!(keys, vec!["p1", "p2", "p3", "p4", "p5"]);
    assert_eq!(client.page_calls(), 2);
    assert_eq!(counters.snapshot().processed, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fan_out_joins_every_task_before_closing() {
    let first = ids("m", 30);
    let second = ids("n", 30);
    let client = Arc::new(
        ScriptedClient::new(SourceKind::PagedMessageLike)
            .detail_page(&as_strs(&first), Some(60))
            .detail_page(&as_strs(&second), Some(60))
            .with_detail_latency(15),
    );
    let collector = collector(&client, 3, 5);

    // Capacity 1 keeps senders blocked while the channel is full
    let (result, items, counters) = run_collector(&collector, ScanParams::new("k"), 1).await;
    result.unwrap();

    let received: HashSet<String> = items.iter().map(|i| i.key().to_string()).collect();
    let expected: HashSet<String> = first.iter().chain(second.iter()).cloned().collect();
    assert_eq!(received, expected);

    let snapshot = counters.snapshot();
    assert_eq!(snapshot.processed, 60);
    assert_eq!(snapshot.active, 0);
    assert_eq!(snapshot.total_hint, 60);
}

#[tokio::test]
async fn test_page_retried_after_throttling() {
    let client = Arc::new(
        ScriptedClient::new(SourceKind::PagedMediaLike)
            .items_page(vec![media("a")])
            .items_page(vec![media("b")])
            .fail_page(1, vec![throttled()]),
    );
    let collector = collector(&client, 3, 5);

    let (result, items, _) = run_collector(&collector, ScanParams::new("k"), 4).await;
    result.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(client.page_calls(), 3);
}

#[tokio::test]
async fn test_fatal_page_error_fails_without_retry() {
    let client = Arc::new(
        ScriptedClient::new(SourceKind::PagedMediaLike)
            .items_page(vec![media("a")])
            .items_page(vec![media("b")])
            .fail_page(1, vec![unauthorized()]),
    );
    let collector = collector(&client, 3, 5);

    let (result, items, _) = run_collector(&collector, ScanParams::new("k"), 4).await;
    match result {
        Err(CollectError::PageFailed { page, message }) => {
            assert_eq!(page, 2);
            assert!(message.contains("401"), "unexpected message: {}", message);
        }
        other => panic!("expected page failure, got {:?}", other),
    }
    assert_eq!(items.len(), 1);
    assert_eq!(client.page_calls(), 2);
}

#[tokio::test]
async fn test_page_retries_stop_at_the_bound() {
    let client = Arc::new(
        ScriptedClient::new(SourceKind::PagedDriveLike)
            .items_page(vec![media("never")])
            .fail_page(0, vec![throttled(); 10]),
    );
    let collector = collector(&client, 3, 5);

    let (result, items, _) = run_collector(&collector, ScanParams::new("k"), 4).await;
    assert!(matches!(result, Err(CollectError::PageFailed { page: 1, .. })));
    assert!(items.is_empty());
    assert_eq!(client.page_calls(), 3);
}

#[tokio::test]
async fn test_item_failures_skip_only_that_item() {
    let page = ids("m", 5);
    let client = Arc::new(
        ScriptedClient::new(SourceKind::PagedMessageLike)
            .detail_page(&as_strs(&page), None)
            .always_throttle_detail("m1")
            .reject_detail("m3")
            .throttle_detail("m4", 2),
    );
    let collector = collector(&client, 3, 4);

    let (result, items, counters) = run_collector(&collector, ScanParams::new("k"), 4).await;
    result.unwrap();

    let mut keys: Vec<&str> = items.iter().map(|item| item.key()).collect();
    keys.sort();
    assert_eq!(keys, vec!["m0", "m2", "m4"]);
    assert_eq!(client.detail_calls("m1"), 4);
    assert_eq!(client.detail_calls("m3"), 1);
    assert_eq!(client.detail_calls("m4"), 3);
    assert_eq!(counters.snapshot().processed, 3);
    assert_eq!(counters.snapshot().active, 0);
}

#[tokio::test]
async fn test_page_failure_still_joins_started_detail_tasks() {
    let first = ids("m", 4);
    let client = Arc::new(
        ScriptedClient::new(SourceKind::PagedMessageLike)
            .detail_page(&as_strs(&first), None)
            .detail_page(&["late"], None)
            .fail_page(1, vec![unauthorized()])
            .with_detail_latency(10),
    );
    let collector = collector(&client, 3, 5);

    let (result, items, counters) = run_collector(&collector, ScanParams::new("k"), 1).await;
    assert!(matches!(result, Err(CollectError::PageFailed { page: 2, .. })));
    assert_eq!(items.len(), 4);
    assert_eq!(counters.snapshot().active, 0);
}

#[tokio::test]
async fn test_shutdown_cancels_collection() {
    let client = Arc::new(
        ScriptedClient::new(SourceKind::PagedMediaLike).items_page(vec![media("a")]),
    );
    let collector = collector(&client, 3, 5);
    let shutdown = ShutdownCoordinator::new();
    shutdown.trigger_shutdown();

    let (result, items, _) =
        run_collector_with_shutdown(&collector, ScanParams::new("k"), 4, shutdown).await;
    assert_eq!(result, Err(CollectError::Cancelled));
    assert!(items.is_empty());
    assert_eq!(client.page_calls(), 0);
}
