//! Paginated / fan-out collector
//!
//! A single loop drives pagination, so pages are strictly ordered. Listing
//! rows that need a detail call are fanned out as one task each; every task
//! takes its own rate limiter token per attempt, so throughput is bounded by
//! the limiter rather than by a worker count. The collector joins every task
//! before returning.
//!
//! Failure budget: a page that fails fatally, or stays throttled past the page
//! policy, fails the scan. A detail call that does the same under the item
//! policy skips that one item.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::collector::counters::ItemSender;
use crate::collector::error::{ClientError, CollectError, CollectResult};
use crate::collector::traits::{CollectContext, Collector, SourceClient};
use crate::collector::types::{PageEntry, PageQuery, SourceKind};
use crate::core::rate_limit::{RateLimitError, RateLimiter};
use crate::core::retry::{retry_classified, RetryError, RetryPolicy};
use crate::core::shutdown::ShutdownCoordinator;
use crate::scanner::types::ScanId;

/// Result of one fan-out task that did not fail the scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Sent,
    Skipped,
}

/// Totals for one collection run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PagedStats {
    pub pages: usize,
    pub direct_items: u64,
    pub detail_items: u64,
    pub skipped_items: u64,
}

pub struct PagedCollector<C: SourceClient> {
    client: Arc<C>,
    limiter: Arc<RateLimiter>,
    page_policy: RetryPolicy,
    item_policy: RetryPolicy,
    page_size: Option<u32>,
}

impl<C: SourceClient> PagedCollector<C> {
    pub fn new(client: Arc<C>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client,
            limiter,
            page_policy: RetryPolicy::page_default(),
            item_policy: RetryPolicy::item_default(),
            page_size: None,
        }
    }

    pub fn with_policies(mut self, page_policy: RetryPolicy, item_policy: RetryPolicy) -> Self {
        self.page_policy = page_policy;
        self.item_policy = item_policy;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    async fn page_loop(
        &self,
        ctx: &CollectContext,
        query: &PageQuery,
        tasks: &mut JoinSet<CollectResult<ItemOutcome>>,
        stats: &mut PagedStats,
    ) -> CollectResult<()> {
        let client: &C = &self.client;
        let mut page_token: Option<String> = None;

        loop {
            let page_number = stats.pages + 1;
            let token = page_token.as_deref();
            let page = retry_classified(
                &format!("{} list page {}", client.kind(), page_number),
                &self.page_policy,
                &self.limiter,
                &ctx.shutdown,
                |e: &ClientError| client.classify(e),
                move || client.list_page(query, token),
            )
            .await
            .map_err(|e| CollectError::from_page_retry(page_number, e))?;
            stats.pages = page_number;

            if let Some(estimate) = page.result_size_estimate {
                ctx.items.counters().record_total_hint(estimate);
            }
            let next_token = page.continuation().map(str::to_string);
            log::debug!(
                "Scan {}: page {} has {} entries, next token: {}",
                ctx.scan_id,
                page_number,
                page.entries.len(),
                next_token.is_some()
            );

            for entry in page.entries {
                match entry {
                    PageEntry::Item(item) => {
                        ctx.items.send(item).await?;
                        stats.direct_items += 1;
                    }
                    PageEntry::Detail(id) => {
                        tasks.spawn(fetch_detail(
                            Arc::clone(&self.client),
                            Arc::clone(&self.limiter),
                            self.item_policy.clone(),
                            ctx.items.clone(),
                            ctx.shutdown.clone(),
                            ctx.scan_id,
                            id,
                        ));
                    }
                }
            }

            match next_token {
                Some(token) => page_token = Some(token),
                None => return Ok(()),
            }
        }
    }
}

/// One fan-out task: detail call under the item policy, then send
async fn fetch_detail<C: SourceClient>(
    client: Arc<C>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    items: ItemSender,
    shutdown: ShutdownCoordinator,
    scan_id: ScanId,
    id: String,
) -> CollectResult<ItemOutcome> {
    let _active = items.counters().track_active();
    let client_ref: &C = &client;
    let id_ref: &str = &id;

    let outcome = retry_classified(
        &format!("{} detail {}", client_ref.kind(), id_ref),
        &policy,
        &limiter,
        &shutdown,
        |e: &ClientError| client_ref.classify(e),
        move || client_ref.get_item_detail(id_ref),
    )
    .await;

    match outcome {
        Ok(item) => {
            items.send(item).await?;
            Ok(ItemOutcome::Sent)
        }
        Err(RetryError::RateLimit(RateLimitError::Cancelled)) => Err(CollectError::Cancelled),
        Err(RetryError::RateLimit(other)) => Err(other.into()),
        Err(e) => {
            log::warn!("Scan {}: skipping item {}: {}", scan_id, id, e);
            Ok(ItemOutcome::Skipped)
        }
    }
}

/// Wait for every fan-out task; keep the first scan-level failure
async fn join_fan_out(
    tasks: &mut JoinSet<CollectResult<ItemOutcome>>,
    stats: &mut PagedStats,
) -> CollectResult<()> {
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(ItemOutcome::Sent)) => stats.detail_items += 1,
            Ok(Ok(ItemOutcome::Skipped)) => stats.skipped_items += 1,
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(join_error) => {
                first_error.get_or_insert(CollectError::Panicked {
                    message: join_error.to_string(),
                });
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[async_trait]
impl<C: SourceClient> Collector for PagedCollector<C> {
    fn kind(&self) -> SourceKind {
        self.client.kind()
    }

    async fn collect(&self, ctx: CollectContext) -> CollectResult<()> {
        let query = PageQuery {
            query: ctx.params.query.clone(),
            page_size: self.page_size,
        };
        let mut tasks = JoinSet::new();
        let mut stats = PagedStats::default();

        let paging = self.page_loop(&ctx, &query, &mut tasks, &mut stats).await;
        if let Err(e) = &paging {
            log::error!(
                "Scan {}: pagination stopped, waiting for {} detail tasks: {}",
                ctx.scan_id,
                tasks.len(),
                e
            );
        }
        let fan_out = join_fan_out(&mut tasks, &mut stats).await;

        log::info!(
            "Scan {}: {} pages, {} listed items, {} detailed items, {} skipped",
            ctx.scan_id,
            stats.pages,
            stats.direct_items,
            stats.detail_items,
            stats.skipped_items
        );
        paging.and(fan_out)
    }
}
