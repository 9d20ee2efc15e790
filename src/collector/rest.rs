//! REST source client for the paginated providers
//!
//! Speaks the JSON listing shapes of the three hosted APIs: drive-style file
//! listings and media listings carry full metadata per row, message listings
//! carry only ids and need one detail call each.
//!
//! Throttling is signalled by HTTP 429, or by 403 with a `rateLimitExceeded`
//! or `userRateLimitExceeded` reason in the error body. Those are retryable;
//! every other failure is fatal.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::collector::error::{ClientError, CollectError, CollectResult};
use crate::collector::traits::SourceClient;
use crate::collector::types::{
    CollectedItem, FileItem, MediaItem, MessageItem, Page, PageEntry, PageQuery, SourceKind,
    UNKNOWN_SIZE,
};
use crate::core::config::RestSourceConfig;
use crate::core::retry::ErrorClass;

const RATE_LIMIT_REASONS: [&str; 2] = ["rateLimitExceeded", "userRateLimitExceeded"];
const DRIVE_FIELDS: &str =
    "nextPageToken,files(id,name,mimeType,size,modifiedTime,md5Checksum,parents)";

pub struct RestSourceClient {
    kind: SourceKind,
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RestSourceClient {
    pub fn new(
        kind: SourceKind,
        base_url: impl Into<String>,
        token: Option<String>,
    ) -> CollectResult<Self> {
        if !kind.is_paginated() {
            return Err(CollectError::InvalidParams {
                message: format!("{} is not served by a REST client", kind),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CollectError::InvalidParams {
                message: format!("cannot build HTTP client: {}", e),
            })?;
        Ok(Self {
            kind,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build from configuration, reading the bearer token from `token_env`
    pub fn from_config(kind: SourceKind, config: &RestSourceConfig) -> CollectResult<Self> {
        let token = match &config.token_env {
            Some(var) => match std::env::var(var) {
                Ok(token) => Some(token),
                Err(_) => {
                    return Err(CollectError::InvalidParams {
                        message: format!("environment variable {} is not set", var),
                    })
                }
            },
            None => None,
        };
        Self::new(kind, config.base_url.clone(), token)
    }

    async fn get_body(&self, url: &str, params: &[(&str, String)]) -> Result<Vec<u8>, ClientError> {
        let mut request = self.http.get(url).query(params);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| ClientError::Transport {
            message: e.to_string(),
        })?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| ClientError::Transport {
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body));
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl SourceClient for RestSourceClient {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn list_page(
        &self,
        query: &PageQuery,
        page_token: Option<&str>,
    ) -> Result<Page, ClientError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        match self.kind {
            SourceKind::PagedDriveLike => {
                if let Some(q) = &query.query {
                    params.push(("q", q.clone()));
                }
                if let Some(size) = query.page_size {
                    params.push(("pageSize", size.to_string()));
                }
                params.push(("fields", DRIVE_FIELDS.to_string()));
                let body = self.get_body(&self.base_url, &params).await?;
                parse_page(self.kind, &body)
            }
            SourceKind::PagedMessageLike => {
                if let Some(q) = &query.query {
                    params.push(("q", q.clone()));
                }
                if let Some(size) = query.page_size {
                    params.push(("maxResults", size.to_string()));
                }
                let body = self.get_body(&self.base_url, &params).await?;
                parse_page(self.kind, &body)
            }
            SourceKind::PagedMediaLike => {
                if query.query.is_some() {
                    log::debug!("Media listing ignores the query filter");
                }
                if let Some(size) = query.page_size {
                    params.push(("pageSize", size.to_string()));
                }
                let body = self.get_body(&self.base_url, &params).await?;
                parse_page(self.kind, &body)
            }
            SourceKind::Filesystem => Err(ClientError::Decode {
                message: "filesystem has no listing endpoint".to_string(),
            }),
        }
    }

    async fn get_item_detail(&self, id: &str) -> Result<CollectedItem, ClientError> {
        let url = format!("{}/{}", self.base_url, id);
        let params = [
            ("format", "metadata".to_string()),
            ("metadataHeaders", "Subject".to_string()),
            ("metadataHeaders", "From".to_string()),
        ];
        let body = self.get_body(&url, &params).await?;
        parse_message_detail(&body)
    }

    fn classify(&self, error: &ClientError) -> ErrorClass {
        classify_client_error(error)
    }
}

/// Throttling is retryable, everything else is fatal
pub fn classify_client_error(error: &ClientError) -> ErrorClass {
    match error {
        ClientError::Status { status: 429, .. } => ErrorClass::Retryable,
        ClientError::Status {
            status: 403,
            reason: Some(reason),
            ..
        } if RATE_LIMIT_REASONS.contains(&reason.as_str()) => ErrorClass::Retryable,
        _ => ErrorClass::Fatal,
    }
}

/// Build a status error from a non-success response body
pub fn status_error(status: u16, body: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let reason = envelope.error.errors.first().and_then(|e| e.reason.clone());
            let message = envelope
                .error
                .message
                .unwrap_or_else(|| "no error message".to_string());
            ClientError::status(status, reason.as_deref(), message)
        }
        Err(_) => ClientError::status(status, None, String::from_utf8_lossy(body).into_owned()),
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    mime_type: Option<String>,
    size: Option<String>,
    modified_time: Option<DateTime<Utc>>,
    md5_checksum: Option<String>,
}

const DRIVE_FOLDER_MIME: &str = "application/vnd.google-apps.folder";

impl DriveList {
    fn into_page(self) -> Page {
        let entries = self
            .files
            .into_iter()
            .map(|file| {
                let is_dir = file.mime_type.as_deref() == Some(DRIVE_FOLDER_MIME);
                PageEntry::Item(CollectedItem::File(FileItem {
                    key: file.id,
                    name: file.name,
                    path: None,
                    size: parse_size(file.size.as_deref()),
                    modified: file.modified_time,
                    hash: file.md5_checksum,
                    is_dir,
                    child_count: 0,
                    mime_type: file.mime_type,
                }))
            })
            .collect();
        Page {
            entries,
            next_page_token: self.next_page_token,
            result_size_estimate: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
    result_size_estimate: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

impl MessageList {
    fn into_page(self) -> Page {
        Page {
            entries: self
                .messages
                .into_iter()
                .map(|m| PageEntry::Detail(m.id))
                .collect(),
            next_page_token: self.next_page_token,
            result_size_estimate: self.result_size_estimate,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    id: String,
    thread_id: Option<String>,
    #[serde(default)]
    label_ids: Vec<String>,
    snippet: Option<String>,
    size_estimate: Option<i64>,
    /// Milliseconds since the epoch, as a string
    internal_date: Option<String>,
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
    name: String,
    value: String,
}

impl MessageDetail {
    fn header(&self, name: &str) -> Option<String> {
        self.payload.as_ref().and_then(|p| {
            p.headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
        })
    }

    fn into_item(self) -> MessageItem {
        let subject = self.header("Subject").unwrap_or_default();
        let from = self.header("From");
        let modified = self
            .internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        MessageItem {
            key: self.id,
            name: subject,
            size: self.size_estimate.unwrap_or(UNKNOWN_SIZE),
            modified,
            hash: None,
            thread_id: self.thread_id,
            from,
            labels: self.label_ids,
            snippet: self.snippet,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaList {
    #[serde(default)]
    media_items: Vec<MediaEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaEntry {
    id: String,
    #[serde(default)]
    filename: String,
    mime_type: Option<String>,
    media_metadata: Option<MediaMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaMetadata {
    creation_time: Option<DateTime<Utc>>,
    width: Option<String>,
    height: Option<String>,
}

impl MediaList {
    fn into_page(self) -> Page {
        let entries = self
            .media_items
            .into_iter()
            .map(|media| {
                let metadata = media.media_metadata;
                let dimension = |value: Option<&String>| value.and_then(|v| v.parse::<u32>().ok());
                PageEntry::Item(CollectedItem::Media(MediaItem {
                    key: media.id,
                    name: media.filename,
                    size: UNKNOWN_SIZE,
                    modified: metadata.as_ref().and_then(|m| m.creation_time),
                    hash: None,
                    mime_type: media.mime_type,
                    width: dimension(metadata.as_ref().and_then(|m| m.width.as_ref())),
                    height: dimension(metadata.as_ref().and_then(|m| m.height.as_ref())),
                }))
            })
            .collect();
        Page {
            entries,
            next_page_token: self.next_page_token,
            result_size_estimate: None,
        }
    }
}

fn parse_size(size: Option<&str>) -> i64 {
    size.and_then(|s| s.parse::<i64>().ok()).unwrap_or(UNKNOWN_SIZE)
}

/// Decode one listing body for `kind`
pub fn parse_page(kind: SourceKind, body: &[u8]) -> Result<Page, ClientError> {
    let decode = |e: serde_json::Error| ClientError::Decode {
        message: e.to_string(),
    };
    match kind {
        SourceKind::PagedDriveLike => serde_json::from_slice::<DriveList>(body)
            .map(DriveList::into_page)
            .map_err(decode),
        SourceKind::PagedMessageLike => serde_json::from_slice::<MessageList>(body)
            .map(MessageList::into_page)
            .map_err(decode),
        SourceKind::PagedMediaLike => serde_json::from_slice::<MediaList>(body)
            .map(MediaList::into_page)
            .map_err(decode),
        SourceKind::Filesystem => Err(ClientError::Decode {
            message: "filesystem has no listing format".to_string(),
        }),
    }
}

/// Decode one message detail body
pub fn parse_message_detail(body: &[u8]) -> Result<CollectedItem, ClientError> {
    serde_json::from_slice::<MessageDetail>(body)
        .map(|detail| CollectedItem::Message(detail.into_item()))
        .map_err(|e| ClientError::Decode {
            message: e.to_string(),
        })
}
