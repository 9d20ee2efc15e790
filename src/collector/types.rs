//! Collected item model and page shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Size reported when the provider does not expose one
pub const UNKNOWN_SIZE: i64 = -1;

/// Category of data origin
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[strum(serialize = "filesystem")]
    #[serde(rename = "filesystem")]
    Filesystem,
    #[strum(serialize = "drive")]
    #[serde(rename = "drive")]
    PagedDriveLike,
    #[strum(serialize = "messages")]
    #[serde(rename = "messages")]
    PagedMessageLike,
    #[strum(serialize = "media")]
    #[serde(rename = "media")]
    PagedMediaLike,
}

impl SourceKind {
    pub fn is_paginated(self) -> bool {
        !matches!(self, SourceKind::Filesystem)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileItem {
    /// Path for local files, provider id for remote ones
    pub key: String,
    pub name: String,
    pub path: Option<String>,
    /// Bytes; for directories the aggregate of all non-hidden descendants
    pub size: i64,
    pub modified: Option<DateTime<Utc>>,
    /// Hex SHA-256 for local files; provider checksum for remote ones
    pub hash: Option<String>,
    pub is_dir: bool,
    /// Number of files below a directory (recursive); zero for files
    pub child_count: u64,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageItem {
    pub key: String,
    /// Subject line
    pub name: String,
    pub size: i64,
    pub modified: Option<DateTime<Utc>>,
    pub hash: Option<String>,
    pub thread_id: Option<String>,
    pub from: Option<String>,
    pub labels: Vec<String>,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub key: String,
    /// Original filename
    pub name: String,
    pub size: i64,
    pub modified: Option<DateTime<Utc>>,
    pub hash: Option<String>,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// One unit of collected metadata; immutable once emitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectedItem {
    File(FileItem),
    Message(MessageItem),
    Media(MediaItem),
}

impl CollectedItem {
    pub fn key(&self) -> &str {
        match self {
            CollectedItem::File(item) => &item.key,
            CollectedItem::Message(item) => &item.key,
            CollectedItem::Media(item) => &item.key,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CollectedItem::File(item) => &item.name,
            CollectedItem::Message(item) => &item.name,
            CollectedItem::Media(item) => &item.name,
        }
    }

    pub fn size(&self) -> i64 {
        match self {
            CollectedItem::File(item) => item.size,
            CollectedItem::Message(item) => item.size,
            CollectedItem::Media(item) => item.size,
        }
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        match self {
            CollectedItem::File(item) => item.modified,
            CollectedItem::Message(item) => item.modified,
            CollectedItem::Media(item) => item.modified,
        }
    }

    pub fn hash(&self) -> Option<&str> {
        match self {
            CollectedItem::File(item) => item.hash.as_deref(),
            CollectedItem::Message(item) => item.hash.as_deref(),
            CollectedItem::Media(item) => item.hash.as_deref(),
        }
    }
}

/// Filter and sizing for a paginated listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageQuery {
    pub query: Option<String>,
    pub page_size: Option<u32>,
}

/// One row of a listing page
#[derive(Debug, Clone, PartialEq)]
pub enum PageEntry {
    /// The listing already carries full metadata
    Item(CollectedItem),
    /// Only an id; a detail call is needed
    Detail(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub entries: Vec<PageEntry>,
    pub next_page_token: Option<String>,
    /// Provider's estimate of the total result count, if any
    pub result_size_estimate: Option<u64>,
}

impl Page {
    /// The token to request next, or `None` when this is the last page
    pub fn continuation(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}
