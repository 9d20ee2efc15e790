//! Progress snapshot published while a scan collects

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::counters::CounterSnapshot;
use crate::scanner::types::ScanId;

/// Immutable progress snapshot
///
/// Serialises to the server-push payload shape:
/// `{client_key, processed_count, active_count, completion_pct, elapsed_in_sec, eta_in_sec, scan_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(rename = "client_key")]
    pub source_key: String,
    pub processed_count: u64,
    pub active_count: u64,
    pub completion_pct: f64,
    #[serde(rename = "elapsed_in_sec")]
    pub elapsed_seconds: u64,
    #[serde(rename = "eta_in_sec")]
    pub eta_seconds: u64,
    pub scan_id: ScanId,
}

impl Progress {
    /// Build a snapshot from the scan counters
    ///
    /// With a total estimate the percentage and ETA are extrapolated from the
    /// processed count. Without one they stay at zero until `finished`, which
    /// reports 100% and no remaining time.
    pub fn from_counters(
        scan_id: ScanId,
        source_key: &str,
        counters: CounterSnapshot,
        elapsed: Duration,
        finished: bool,
    ) -> Self {
        let elapsed_secs = elapsed.as_secs_f64();
        let (completion_pct, eta_seconds) = if finished {
            (100.0, 0)
        } else if counters.total_hint > 0 {
            let done = counters.processed.min(counters.total_hint);
            let pct = done as f64 / counters.total_hint as f64 * 100.0;
            let eta = if done > 0 {
                let per_item = elapsed_secs / done as f64;
                (per_item * (counters.total_hint - done) as f64).round() as u64
            } else {
                0
            };
            (pct, eta)
        } else {
            (0.0, 0)
        };

        Self {
            source_key: source_key.to_string(),
            processed_count: counters.processed,
            active_count: counters.active,
            completion_pct,
            elapsed_seconds: elapsed.as_secs(),
            eta_seconds,
            scan_id,
        }
    }
}
