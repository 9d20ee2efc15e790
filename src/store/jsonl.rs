//! JSON-lines store
//!
//! Layout under the store directory:
//! - `scan-<id>.json`: the scan record and its parameters, rewritten on every
//!   status change
//! - `scan-<id>.items.jsonl`: one collected item per line, appended as items
//!   arrive
//!
//! Scan records are also cached in memory. Opening an existing directory
//! continues numbering after the highest scan id found there.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::collector::types::{CollectedItem, SourceKind};
use crate::core::sync::handle_mutex_poison;
use crate::scanner::types::{Scan, ScanId, ScanParams, ScanStatus};
use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::{finish_scan, Store};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScanFile {
    scan: Scan,
    params: Option<ScanParams>,
}

#[derive(Default)]
struct JsonLinesState {
    next_id: u64,
    scans: HashMap<ScanId, ScanFile>,
}

pub struct JsonLinesStore {
    dir: PathBuf,
    state: Mutex<JsonLinesState>,
}

impl JsonLinesStore {
    /// Open (creating if needed) a store directory
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io("create store directory", &dir, e))?;

        let mut state = JsonLinesState::default();
        let entries =
            std::fs::read_dir(&dir).map_err(|e| StoreError::io("list store directory", &dir, e))?;
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            let is_scan_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("scan-") && n.ends_with(".json"));
            if !is_scan_file {
                continue;
            }
            match read_scan_file(&path) {
                Ok(file) => {
                    state.next_id = state.next_id.max(file.scan.id.0);
                    state.scans.insert(file.scan.id, file);
                }
                Err(e) => log::warn!("Ignoring unreadable scan record {}: {}", path.display(), e),
            }
        }

        log::debug!(
            "Opened store {} with {} existing scans",
            dir.display(),
            state.scans.len()
        );
        Ok(Self {
            dir,
            state: Mutex::new(state),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn scan_path(&self, id: ScanId) -> PathBuf {
        self.dir.join(format!("scan-{}.json", id))
    }

    fn items_path(&self, id: ScanId) -> PathBuf {
        self.dir.join(format!("scan-{}.items.jsonl", id))
    }

    /// Apply `f` to the cached record and return the serialised result
    fn update(
        &self,
        id: ScanId,
        f: impl FnOnce(&mut ScanFile) -> StoreResult<()>,
    ) -> StoreResult<Vec<u8>> {
        let mut state = handle_mutex_poison(self.state.lock(), |what| StoreError::Poisoned {
            what,
        })?;
        let file = state.scans.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        f(file)?;
        Ok(serde_json::to_vec_pretty(file)?)
    }

    fn ensure_known(&self, id: ScanId) -> StoreResult<()> {
        let state = handle_mutex_poison(self.state.lock(), |what| StoreError::Poisoned {
            what,
        })?;
        if state.scans.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound { id })
        }
    }

    async fn write_scan_file(&self, id: ScanId, contents: Vec<u8>) -> StoreResult<()> {
        let path = self.scan_path(id);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| StoreError::io("write scan record", &path, e))
    }
}

fn read_scan_file(path: &Path) -> StoreResult<ScanFile> {
    let contents =
        std::fs::read(path).map_err(|e| StoreError::io("read scan record", path, e))?;
    Ok(serde_json::from_slice(&contents)?)
}

#[async_trait]
impl Store for JsonLinesStore {
    async fn create_scan(&self, kind: SourceKind) -> StoreResult<ScanId> {
        let (id, contents) = {
            let mut state = handle_mutex_poison(self.state.lock(), |what| {
                StoreError::Poisoned { what }
            })?;
            state.next_id += 1;
            let id = ScanId(state.next_id);
            let file = ScanFile {
                scan: Scan::new(id, kind),
                params: None,
            };
            let contents = serde_json::to_vec_pretty(&file)?;
            state.scans.insert(id, file);
            (id, contents)
        };
        self.write_scan_file(id, contents).await?;
        Ok(id)
    }

    async fn save_scan_metadata(&self, id: ScanId, params: &ScanParams) -> StoreResult<()> {
        let contents = self.update(id, |file| {
            file.params = Some(params.clone());
            Ok(())
        })?;
        self.write_scan_file(id, contents).await
    }

    async fn mark_started(&self, id: ScanId) -> StoreResult<()> {
        let contents = self.update(id, |file| {
            file.scan.started_at = Some(Utc::now());
            Ok(())
        })?;
        self.write_scan_file(id, contents).await
    }

    async fn mark_completed(&self, id: ScanId) -> StoreResult<()> {
        let contents =
            self.update(id, |file| finish_scan(&mut file.scan, ScanStatus::Completed, None))?;
        self.write_scan_file(id, contents).await
    }

    async fn mark_failed(&self, id: ScanId, message: &str) -> StoreResult<()> {
        let contents = self.update(id, |file| {
            finish_scan(&mut file.scan, ScanStatus::Failed, Some(message))
        })?;
        self.write_scan_file(id, contents).await
    }

    async fn save_item(&self, id: ScanId, item: &CollectedItem) -> StoreResult<()> {
        self.ensure_known(id)?;
        let mut line = serde_json::to_vec(item)?;
        line.push(b'\n');

        let path = self.items_path(id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io("open item log", &path, e))?;
        file.write_all(&line)
            .await
            .map_err(|e| StoreError::io("append item", &path, e))
    }

    async fn get_scan(&self, id: ScanId) -> StoreResult<Scan> {
        let state = handle_mutex_poison(self.state.lock(), |what| StoreError::Poisoned {
            what,
        })?;
        state
            .scans
            .get(&id)
            .map(|file| file.scan.clone())
            .ok_or(StoreError::NotFound { id })
    }

    async fn list_items(&self, id: ScanId) -> StoreResult<Vec<CollectedItem>> {
        self.ensure_known(id)?;
        let path = self.items_path(id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io("read item log", &path, e)),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}
