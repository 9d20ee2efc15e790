//! Scan lifecycle controller
//!
//! `start_scan` creates the scan record and returns its id straight away. The
//! rest runs on a spawned pipeline task:
//!
//! 1. wait for the source kind's lock (FIFO), then reset that kind's counters
//! 2. run the collector into the bounded item channel while a sink task drains
//!    the channel into the store and the progress reporter publishes snapshots
//! 3. capture the final snapshot and release the lock once collection returns;
//!    subscribers never hold up the lock or the terminal status
//! 4. the sink, after the channel has closed and drained, records exactly one
//!    terminal status from the collector's outcome
//!
//! The item channel closes when the collector drops its last sender, which
//! happens only after every fan-out task has been joined.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, watch};

use crate::collector::counters::{CounterSnapshot, ItemSender};
use crate::collector::error::{CollectError, CollectResult};
use crate::collector::progress::ProgressReporter;
use crate::collector::traits::{CollectContext, Collector};
use crate::collector::types::{CollectedItem, SourceKind};
use crate::core::config::PipelineConfig;
use crate::core::shutdown::ShutdownCoordinator;
use crate::core::sync::handle_mutex_poison;
use crate::notifications::api::ProgressHub;
use crate::scanner::error::{ScanError, ScanResult};
use crate::scanner::locks::SourceLocks;
use crate::scanner::types::{ScanId, ScanParams, ScanStatus};
use crate::store::api::{Store, StoreError};

type StatusWatch = watch::Receiver<Option<ScanStatus>>;

struct ControllerInner {
    store: Arc<dyn Store>,
    hub: ProgressHub,
    collectors: HashMap<SourceKind, Arc<dyn Collector>>,
    locks: SourceLocks,
    config: PipelineConfig,
    shutdown: ShutdownCoordinator,
    scans: Mutex<HashMap<ScanId, StatusWatch>>,
}

/// Cloneable handle to the controller
#[derive(Clone)]
pub struct ScanController {
    inner: Arc<ControllerInner>,
}

pub struct ScanControllerBuilder {
    store: Arc<dyn Store>,
    hub: ProgressHub,
    collectors: HashMap<SourceKind, Arc<dyn Collector>>,
    config: PipelineConfig,
    shutdown: ShutdownCoordinator,
}

impl ScanControllerBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Register the collector for its kind, replacing any earlier one
    pub fn collector(mut self, collector: Arc<dyn Collector>) -> Self {
        let kind = collector.kind();
        if self.collectors.insert(kind, collector).is_some() {
            log::warn!("Collector for '{}' replaced an existing registration", kind);
        }
        self
    }

    pub fn build(self) -> ScanController {
        ScanController {
            inner: Arc::new(ControllerInner {
                store: self.store,
                hub: self.hub,
                collectors: self.collectors,
                locks: SourceLocks::new(),
                config: self.config,
                shutdown: self.shutdown,
                scans: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl ScanController {
    pub fn builder(store: Arc<dyn Store>, hub: ProgressHub) -> ScanControllerBuilder {
        ScanControllerBuilder {
            store,
            hub,
            collectors: HashMap::new(),
            config: PipelineConfig::default(),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.inner.hub
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    pub fn supports(&self, kind: SourceKind) -> bool {
        self.inner.collectors.contains_key(&kind)
    }

    /// Create a scan record and start its pipeline without waiting for it
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start_scan(&self, kind: SourceKind, params: ScanParams) -> ScanResult<ScanId> {
        if self.inner.shutdown.is_shutdown_requested() {
            return Err(ScanError::ShuttingDown);
        }
        let collector = self
            .inner
            .collectors
            .get(&kind)
            .cloned()
            .ok_or(ScanError::UnsupportedSource { kind })?;
        if kind == SourceKind::Filesystem && params.root.is_none() {
            return Err(ScanError::InvalidParams {
                message: "filesystem scan requires a root directory".to_string(),
            });
        }

        let id = self.inner.store.create_scan(kind).await?;
        if let Err(e) = self.inner.store.save_scan_metadata(id, &params).await {
            log::warn!("Scan {}: cannot save scan metadata: {}", id, e);
        }

        let (status_tx, status_rx) = watch::channel(None);
        {
            let mut scans = handle_mutex_poison(self.inner.scans.lock(), |what| {
                ScanError::Store(StoreError::Poisoned { what })
            })?;
            scans.insert(id, status_rx);
        }

        log::info!(
            "Scan {} created for '{}' (client key '{}')",
            id,
            kind,
            params.client_key
        );
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let status = run_pipeline(inner, id, kind, Arc::new(params), collector).await;
            let _ = status_tx.send(Some(status));
        });
        Ok(id)
    }

    /// Wait for a scan started by this controller to reach a terminal status
    ///
    /// Returns `None` for scans this controller did not start; those are
    /// looked up in the store and reported only if already terminal.
    pub async fn await_scan(&self, id: ScanId) -> Option<ScanStatus> {
        let watch = match self.inner.scans.lock() {
            Ok(scans) => scans.get(&id).cloned(),
            Err(_) => None,
        };
        match watch {
            Some(mut rx) => {
                let status = rx.wait_for(Option::is_some).await.ok()?;
                *status
            }
            None => match self.inner.store.get_scan(id).await {
                Ok(scan) if scan.status.is_terminal() => Some(scan.status),
                _ => None,
            },
        }
    }

    /// Counters of the scan currently (or last) collecting for `kind`
    pub fn counters(&self, kind: SourceKind) -> CounterSnapshot {
        self.inner
            .locks
            .slot(kind)
            .map(|slot| slot.counters().snapshot())
            .unwrap_or_default()
    }

    /// Cancel in-flight scans and refuse new ones
    pub fn shutdown(&self) {
        log::info!("Scan controller shutting down");
        self.inner.shutdown.trigger_shutdown();
    }
}

async fn run_pipeline(
    inner: Arc<ControllerInner>,
    id: ScanId,
    kind: SourceKind,
    params: Arc<ScanParams>,
    collector: Arc<dyn Collector>,
) -> ScanStatus {
    let Some(slot) = inner.locks.slot(kind).cloned() else {
        return settle(inner.store.as_ref(), id, Err(CollectError::InvalidParams {
            message: format!("no lock for source kind {}", kind),
        }))
        .await;
    };

    let guard = tokio::select! {
        guard = slot.acquire() => guard,
        _ = inner.shutdown.cancelled() => {
            log::warn!("Scan {}: cancelled while waiting for the '{}' lock", id, kind);
            return settle(inner.store.as_ref(), id, Err(CollectError::Cancelled)).await;
        }
    };
    log::info!("Scan {}: acquired '{}' source lock", id, kind);
    if let Err(e) = inner.store.mark_started(id).await {
        log::warn!("Scan {}: cannot record start: {}", id, e);
    }

    let counters = Arc::clone(slot.counters());
    counters.reset();

    let reporter = match inner.hub.get_publisher(&params.client_key) {
        Ok(publisher) => Some(ProgressReporter::spawn(
            publisher,
            id,
            params.client_key.clone(),
            Arc::clone(&counters),
            inner.config.progress_interval(),
        )),
        Err(e) => {
            log::warn!("Scan {}: progress reporting disabled: {}", id, e);
            None
        }
    };

    let (item_tx, item_rx) = mpsc::channel(inner.config.item_channel_capacity.max(1));
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let sink = tokio::spawn(sink(Arc::clone(&inner.store), id, item_rx, outcome_rx));

    let ctx = CollectContext {
        scan_id: id,
        params,
        items: ItemSender::new(item_tx, counters),
        shutdown: inner.shutdown.clone(),
    };
    let collected = tokio::spawn(async move { collector.collect(ctx).await })
        .await
        .unwrap_or_else(|e| {
            Err(CollectError::Panicked {
                message: e.to_string(),
            })
        });
    if let Err(e) = &collected {
        log::error!("Scan {}: collection failed: {}", id, e);
    }

    // Delivery of the final snapshot runs detached from the pipeline
    if let Some(reporter) = reporter {
        drop(reporter.finish(collected.is_ok()));
    }
    drop(guard);
    log::debug!("Scan {}: released '{}' source lock", id, kind);

    let _ = outcome_tx.send(collected);
    match sink.await {
        Ok(status) => status,
        Err(e) => {
            log::error!("Scan {}: sink task failed: {}", id, e);
            settle(inner.store.as_ref(), id, Err(CollectError::Panicked {
                message: e.to_string(),
            }))
            .await
        }
    }
}

/// Drain the item channel, then record the terminal status
async fn sink(
    store: Arc<dyn Store>,
    id: ScanId,
    items: mpsc::Receiver<CollectedItem>,
    outcome: oneshot::Receiver<CollectResult<()>>,
) -> ScanStatus {
    let stats = store.persist_stream(id, items).await;
    let outcome = outcome.await.unwrap_or_else(|_| {
        Err(CollectError::Panicked {
            message: "scan pipeline dropped the collection outcome".to_string(),
        })
    });
    log::info!(
        "Scan {}: {} items persisted, {} write failures",
        id,
        stats.saved,
        stats.failed
    );
    settle(store.as_ref(), id, outcome).await
}

async fn settle(store: &dyn Store, id: ScanId, outcome: CollectResult<()>) -> ScanStatus {
    let (status, result) = match outcome {
        Ok(()) => (ScanStatus::Completed, store.mark_completed(id).await),
        Err(e) => (ScanStatus::Failed, store.mark_failed(id, &e.to_string()).await),
    };
    match result {
        Ok(()) => log::info!("Scan {} {}", id, status),
        Err(e) => log::error!("Scan {}: cannot record status {}: {}", id, status, e),
    }
    status
}
