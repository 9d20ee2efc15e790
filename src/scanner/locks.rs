//! Per source-kind exclusion
//!
//! Each source kind owns one async mutex and one set of counters. A scan holds
//! its kind's mutex for the whole collection phase, so scans of one kind run
//! one at a time in acquire order while scans of different kinds overlap.

use std::collections::HashMap;
use std::sync::Arc;

use strum::IntoEnumIterator;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::collector::counters::ScanCounters;
use crate::collector::types::SourceKind;

#[derive(Clone)]
pub struct SourceSlot {
    lock: Arc<Mutex<()>>,
    counters: Arc<ScanCounters>,
}

impl SourceSlot {
    fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            counters: Arc::new(ScanCounters::new()),
        }
    }

    /// Wait for exclusive use of this kind; released when the guard drops
    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.lock).lock_owned().await
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    pub fn counters(&self) -> &Arc<ScanCounters> {
        &self.counters
    }
}

pub struct SourceLocks {
    slots: HashMap<SourceKind, SourceSlot>,
}

impl Default for SourceLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceLocks {
    pub fn new() -> Self {
        Self {
            slots: SourceKind::iter().map(|kind| (kind, SourceSlot::new())).collect(),
        }
    }

    pub fn slot(&self, kind: SourceKind) -> Option<&SourceSlot> {
        self.slots.get(&kind)
    }
}
