//! Periodic progress reporting for a running collection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::collector::counters::ScanCounters;
use crate::notifications::api::Progress;
use crate::scanner::types::ScanId;

/// Publishes a snapshot of the scan counters on a fixed interval
///
/// [`ProgressReporter::finish`] captures the final snapshot at once and leaves
/// its delivery to the reporter task, which then drops the publisher and so
/// closes the hub channel for this scan.
pub struct ProgressReporter {
    scan_id: ScanId,
    source_key: String,
    counters: Arc<ScanCounters>,
    started: Instant,
    finished: Arc<AtomicBool>,
    finish: Option<oneshot::Sender<Progress>>,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn spawn(
        publisher: mpsc::Sender<Progress>,
        scan_id: ScanId,
        source_key: String,
        counters: Arc<ScanCounters>,
        interval: Duration,
    ) -> Self {
        let started = Instant::now();
        let finished = Arc::new(AtomicBool::new(false));
        let (finish_tx, finish_rx) = oneshot::channel();
        let handle = tokio::spawn(report_loop(ReportLoop {
            publisher,
            scan_id,
            source_key: source_key.clone(),
            counters: Arc::clone(&counters),
            started,
            interval,
            finished: Arc::clone(&finished),
            finish: finish_rx,
        }));
        Self {
            scan_id,
            source_key,
            counters,
            started,
            finished,
            finish: Some(finish_tx),
            handle,
        }
    }

    /// Snapshot the counters as the final progress and hand it to the reporter
    ///
    /// Returns without waiting for delivery. After this call the reporter never
    /// reads the counters again, so the caller may hand them to the next scan.
    /// The returned handle completes once the publisher has been dropped.
    pub fn finish(mut self, succeeded: bool) -> JoinHandle<()> {
        self.finished.store(true, Ordering::SeqCst);
        let last = Progress::from_counters(
            self.scan_id,
            &self.source_key,
            self.counters.snapshot(),
            self.started.elapsed(),
            succeeded,
        );
        log::debug!(
            "Scan {}: final progress {} items ({:.1}%)",
            self.scan_id,
            last.processed_count,
            last.completion_pct
        );
        if let Some(finish) = self.finish.take() {
            let _ = finish.send(last);
        }
        self.handle
    }
}

struct ReportLoop {
    publisher: mpsc::Sender<Progress>,
    scan_id: ScanId,
    source_key: String,
    counters: Arc<ScanCounters>,
    started: Instant,
    interval: Duration,
    finished: Arc<AtomicBool>,
    finish: oneshot::Receiver<Progress>,
}

async fn report_loop(mut state: ReportLoop) {
    let mut ticker = tokio::time::interval_at(state.started + state.interval, state.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            last = &mut state.finish => {
                // Dropped without finish: the pipeline is gone, close quietly
                if let Ok(last) = last {
                    let _ = state.publisher.send(last).await;
                }
                return;
            }
            _ = ticker.tick() => {
                let snapshot = Progress::from_counters(
                    state.scan_id,
                    &state.source_key,
                    state.counters.snapshot(),
                    state.started.elapsed(),
                    false,
                );
                // Read after the snapshot: a set flag means the counters may
                // already belong to the next scan
                if state.finished.load(Ordering::SeqCst) {
                    continue;
                }
                log::trace!("Scan {}: progress {} items", state.scan_id, snapshot.processed_count);
                if state.publisher.send(snapshot).await.is_err() {
                    log::debug!("Scan {}: progress channel closed", state.scan_id);
                }
            }
        }
    }
}
