//! Scanner Types and Enums
//!
//! Scan record, lifecycle status and the parameters a scan was started with.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::collector::types::SourceKind;

/// Scan identity, allocated by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(pub u64);

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status; `Completed` and `Failed` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ScanStatus::Running)
    }
}

/// One scan of one source kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub id: ScanId,
    pub source_kind: SourceKind,
    pub status: ScanStatus,
    pub created_at: DateTime<Utc>,
    /// Set when the scan acquires its source kind's lock
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Present iff `status` is `Failed`
    pub error_message: Option<String>,
}

impl Scan {
    pub fn new(id: ScanId, source_kind: SourceKind) -> Self {
        Self {
            id,
            source_kind,
            status: ScanStatus::Running,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            error_message: None,
        }
    }
}

/// Parameters a scan was requested with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanParams {
    /// Key progress is published under; observers subscribe with it
    pub client_key: String,
    /// Root directory for filesystem scans
    pub root: Option<PathBuf>,
    /// Provider-side filter for paginated scans
    pub query: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl ScanParams {
    pub fn new(client_key: impl Into<String>) -> Self {
        Self {
            client_key: client_key.into(),
            ..Self::default()
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_names() {
        assert_eq!(ScanStatus::Completed.to_string(), "completed");
        assert_eq!(ScanStatus::from_str("failed").unwrap(), ScanStatus::Failed);
        assert!(!ScanStatus::Running.is_terminal());
        assert!(ScanStatus::Failed.is_terminal());
    }

    #[test]
    fn test_params_serialise_for_metadata() {
        let params = ScanParams::new("browser-1")
            .with_query("label:inbox")
            .with_option("include_spam", "false");
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["client_key"], "browser-1");
        assert_eq!(value["query"], "label:inbox");
        assert_eq!(value["root"], serde_json::Value::Null);
        assert_eq!(value["options"]["include_spam"], "false");
    }

    #[test]
    fn test_new_scan_is_running() {
        let scan = Scan::new(ScanId(1), SourceKind::Filesystem);
        assert_eq!(scan.status, ScanStatus::Running);
        assert!(scan.started_at.is_none());
        assert!(scan.error_message.is_none());
    }
}
