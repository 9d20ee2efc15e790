//! In-memory store

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::collector::types::{CollectedItem, SourceKind};
use crate::core::sync::handle_mutex_poison;
use crate::scanner::types::{Scan, ScanId, ScanParams, ScanStatus};
use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::{finish_scan, Store};

struct ScanRecord {
    scan: Scan,
    params: Option<ScanParams>,
    items: Vec<CollectedItem>,
}

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    scans: HashMap<ScanId, ScanRecord>,
}

/// Keeps every scan and item for the lifetime of the process
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters recorded for a scan, if any
    pub fn scan_metadata(&self, id: ScanId) -> StoreResult<Option<ScanParams>> {
        self.with_record(id, |record| Ok(record.params.clone()))
    }

    fn with_record<T>(
        &self,
        id: ScanId,
        f: impl FnOnce(&mut ScanRecord) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut state = handle_mutex_poison(self.state.lock(), |what| StoreError::Poisoned {
            what,
        })?;
        let record = state
            .scans
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id })?;
        f(record)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_scan(&self, kind: SourceKind) -> StoreResult<ScanId> {
        let mut state = handle_mutex_poison(self.state.lock(), |what| StoreError::Poisoned {
            what,
        })?;
        state.next_id += 1;
        let id = ScanId(state.next_id);
        state.scans.insert(
            id,
            ScanRecord {
                scan: Scan::new(id, kind),
                params: None,
                items: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn save_scan_metadata(&self, id: ScanId, params: &ScanParams) -> StoreResult<()> {
        self.with_record(id, |record| {
            record.params = Some(params.clone());
            Ok(())
        })
    }

    async fn mark_started(&self, id: ScanId) -> StoreResult<()> {
        self.with_record(id, |record| {
            record.scan.started_at = Some(Utc::now());
            Ok(())
        })
    }

    async fn mark_completed(&self, id: ScanId) -> StoreResult<()> {
        self.with_record(id, |record| {
            finish_scan(&mut record.scan, ScanStatus::Completed, None)
        })
    }

    async fn mark_failed(&self, id: ScanId, message: &str) -> StoreResult<()> {
        self.with_record(id, |record| {
            finish_scan(&mut record.scan, ScanStatus::Failed, Some(message))
        })
    }

    async fn save_item(&self, id: ScanId, item: &CollectedItem) -> StoreResult<()> {
        self.with_record(id, |record| {
            record.items.push(item.clone());
            Ok(())
        })
    }

    async fn get_scan(&self, id: ScanId) -> StoreResult<Scan> {
        self.with_record(id, |record| Ok(record.scan.clone()))
    }

    async fn list_items(&self, id: ScanId) -> StoreResult<Vec<CollectedItem>> {
        self.with_record(id, |record| Ok(record.items.clone()))
    }
}
