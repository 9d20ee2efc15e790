//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use metaingest::collector::api::{
    ClientError, CollectedItem, Collector, MediaItem, MessageItem, Page, PageEntry, PageQuery,
    PagedCollector, SourceClient, SourceKind, UNKNOWN_SIZE,
};
use metaingest::core::rate_limit::RateLimiter;
use metaingest::core::retry::{ErrorClass, RetryPolicy};
use metaingest::notifications::api::{Progress, ProgressSubscriber};

/// Provider stand-in serving a fixed list of pages
///
/// Listing pages hold media items directly for the media kind, and message
/// ids needing a detail call for the message kind.
pub struct FixtureClient {
    kind: SourceKind,
    pages: Vec<Vec<String>>,
    throttle_first_page: AtomicUsize,
    list_calls: AtomicUsize,
}

impl FixtureClient {
    pub fn media(pages: Vec<Vec<&str>>) -> Self {
        Self::new(SourceKind::PagedMediaLike, pages)
    }

    pub fn messages(pages: Vec<Vec<&str>>) -> Self {
        Self::new(SourceKind::PagedMessageLike, pages)
    }

    fn new(kind: SourceKind, pages: Vec<Vec<&str>>) -> Self {
        Self {
            kind,
            pages: pages
                .into_iter()
                .map(|page| page.into_iter().map(str::to_string).collect())
                .collect(),
            throttle_first_page: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Answer the first `times` listing calls with HTTP 429
    pub fn throttled_first(self, times: usize) -> Self {
        self.throttle_first_page.store(times, Ordering::SeqCst);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn item_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl SourceClient for FixtureClient {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn list_page(
        &self,
        _query: &PageQuery,
        page_token: Option<&str>,
    ) -> Result<Page, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let throttled = self
            .throttle_first_page
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(ClientError::status(429, None, "Too Many Requests"));
        }

        let index: usize = match page_token {
            Some(token) => token
                .parse()
                .map_err(|_| ClientError::status(400, None, "bad page token"))?,
            None => 0,
        };
        let ids = self
            .pages
            .get(index)
            .ok_or_else(|| ClientError::status(400, None, "page out of range"))?;

        let entries = ids
            .iter()
            .map(|id| match self.kind {
                SourceKind::PagedMessageLike => PageEntry::Detail(id.clone()),
                _ => PageEntry::Item(media_item(id)),
            })
            .collect();
        let next_page_token = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
        Ok(Page {
            entries,
            next_page_token,
            result_size_estimate: Some(self.item_count() as u64),
        })
    }

    async fn get_item_detail(&self, id: &str) -> Result<CollectedItem, ClientError> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(CollectedItem::Message(MessageItem {
            key: id.to_string(),
            name: format!("subject {}", id),
            size: 1024,
            modified: None,
            hash: None,
            thread_id: None,
            from: Some("sender@example.com".to_string()),
            labels: vec!["INBOX".to_string()],
            snippet: None,
        }))
    }

    fn classify(&self, error: &ClientError) -> ErrorClass {
        match error {
            ClientError::Status { status: 429, .. } => ErrorClass::Retryable,
            _ => ErrorClass::Fatal,
        }
    }
}

pub fn media_item(id: &str) -> CollectedItem {
    CollectedItem::Media(MediaItem {
        key: id.to_string(),
        name: format!("{}.jpg", id),
        size: UNKNOWN_SIZE,
        modified: None,
        hash: None,
        mime_type: Some("image/jpeg".to_string()),
        width: None,
        height: None,
    })
}

/// Paged collector with a generous limiter and millisecond retry delays
pub fn paged_collector(client: Arc<FixtureClient>) -> Arc<dyn Collector> {
    Arc::new(
        PagedCollector::new(client, Arc::new(RateLimiter::new(10_000.0, 1_000))).with_policies(
            RetryPolicy::new(3, Duration::from_millis(2)),
            RetryPolicy::new(5, Duration::from_millis(2)),
        ),
    )
}

/// Receive until the subscription closes or goes quiet for `idle`
pub async fn drain(subscriber: &ProgressSubscriber, idle: Duration) -> Vec<Progress> {
    let mut seen = Vec::new();
    while let Ok(Some(progress)) = tokio::time::timeout(idle, subscriber.recv()).await {
        seen.push(progress);
    }
    seen
}
