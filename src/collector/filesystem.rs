//! Filesystem tree walker
//!
//! Depth-first, synchronous traversal. Each directory emits one item per child
//! file, then one item for itself carrying the aggregate size and file count of
//! everything below it. Hidden entries are skipped along with their subtree
//! and do not contribute to any aggregate. Symlinks are not followed.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::collector::error::{CollectError, CollectResult};
use crate::collector::traits::{CollectContext, Collector};
use crate::collector::types::{CollectedItem, FileItem, SourceKind};
use crate::core::shutdown::ShutdownCoordinator;

/// Aggregate of a walked directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirSummary {
    pub size: u64,
    pub files: u64,
}

/// Collector for [`SourceKind::Filesystem`]; needs `params.root`
#[derive(Debug, Default)]
pub struct FilesystemCollector;

impl FilesystemCollector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Collector for FilesystemCollector {
    fn kind(&self) -> SourceKind {
        SourceKind::Filesystem
    }

    async fn collect(&self, ctx: CollectContext) -> CollectResult<()> {
        let root = ctx.params.root.clone().ok_or_else(|| CollectError::InvalidParams {
            message: "filesystem scan requires a root directory".to_string(),
        })?;
        let items = ctx.items;
        let shutdown = ctx.shutdown;

        let summary = tokio::task::spawn_blocking(move || {
            let mut walker = TreeWalker::new(|item| items.blocking_send(item), Some(shutdown));
            walker.walk(&root)
        })
        .await
        .map_err(|e| CollectError::Panicked {
            message: format!("tree walker task failed: {}", e),
        })??;

        log::info!(
            "Scan {}: filesystem walk finished, {} files, {} bytes",
            ctx.scan_id,
            summary.files,
            summary.size
        );
        Ok(())
    }
}

/// Recursive walker that hands every item to `emit`
pub struct TreeWalker<F>
where
    F: FnMut(CollectedItem) -> CollectResult<()>,
{
    emit: F,
    visited: HashSet<PathBuf>,
    shutdown: Option<ShutdownCoordinator>,
}

impl<F> TreeWalker<F>
where
    F: FnMut(CollectedItem) -> CollectResult<()>,
{
    pub fn new(emit: F, shutdown: Option<ShutdownCoordinator>) -> Self {
        Self {
            emit,
            visited: HashSet::new(),
            shutdown,
        }
    }

    /// Walk `root`, which must be a readable directory
    pub fn walk(&mut self, root: &Path) -> CollectResult<DirSummary> {
        let metadata = fs::metadata(root).map_err(|e| io_error(root, e))?;
        if !metadata.is_dir() {
            return Err(CollectError::InvalidParams {
                message: format!("{} is not a directory", root.display()),
            });
        }
        fs::read_dir(root).map_err(|e| io_error(root, e))?;
        self.walk_dir(root)
    }

    fn walk_dir(&mut self, dir: &Path) -> CollectResult<DirSummary> {
        let canonical = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        if !self.visited.insert(canonical) {
            log::debug!("Skipping already visited directory {}", dir.display());
            return Ok(DirSummary::default());
        }

        let mut entries = match fs::read_dir(dir) {
            Ok(entries) => entries.filter_map(Result::ok).collect::<Vec<_>>(),
            Err(e) => {
                log::warn!("Cannot list {}: {}", dir.display(), e);
                Vec::new()
            }
        };
        entries.sort_by_key(|entry| entry.file_name());

        let mut summary = DirSummary::default();
        for entry in entries {
            if self.shutdown.as_ref().is_some_and(|s| s.is_shutdown_requested()) {
                return Err(CollectError::Cancelled);
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) {
                continue;
            }

            let path = entry.path();
            let metadata = match fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    log::warn!("Cannot stat {}: {}", path.display(), e);
                    continue;
                }
            };

            if metadata.is_dir() {
                let child = self.walk_dir(&path)?;
                summary.size += child.size;
                summary.files += child.files;
            } else if metadata.is_file() {
                let size = metadata.len();
                (self.emit)(CollectedItem::File(FileItem {
                    key: path.to_string_lossy().into_owned(),
                    name,
                    path: Some(path.to_string_lossy().into_owned()),
                    size: size as i64,
                    modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                    hash: hash_file(&path),
                    is_dir: false,
                    child_count: 0,
                    mime_type: None,
                }))?;
                summary.size += size;
                summary.files += 1;
            }
        }

        let modified = fs::metadata(dir)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        (self.emit)(CollectedItem::File(FileItem {
            key: dir.to_string_lossy().into_owned(),
            name: dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| dir.to_string_lossy().into_owned()),
            path: Some(dir.to_string_lossy().into_owned()),
            size: summary.size as i64,
            modified,
            hash: None,
            is_dir: true,
            child_count: summary.files,
            mime_type: None,
        }))?;

        Ok(summary)
    }
}

/// Dot-prefixed names are hidden
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Streaming SHA-256 of a file as lowercase hex; `None` if it cannot be read
pub fn hash_file(path: &Path) -> Option<String> {
    let mut file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) => {
            log::debug!("Cannot open {} for hashing: {}", path.display(), e);
            return None;
        }
    };
    let mut hasher = Sha256::new();
    match io::copy(&mut file, &mut hasher) {
        Ok(_) => Some(format!("{:x}", hasher.finalize())),
        Err(e) => {
            log::debug!("Cannot hash {}: {}", path.display(), e);
            None
        }
    }
}

fn io_error(path: &Path, error: io::Error) -> CollectError {
    CollectError::Io {
        message: format!("{}: {}", path.display(), error),
    }
}
