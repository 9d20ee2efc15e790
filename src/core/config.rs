//! Pipeline configuration
//!
//! Loaded from TOML. Every field has a default so an empty file (or no file)
//! yields a working configuration.
//!
//! ```toml
//! item_channel_capacity = 10
//! progress_interval_ms = 5000
//!
//! [limits.messages]
//! rate_per_sec = 40.0
//! burst = 20
//!
//! [retry.item]
//! max_attempts = 25
//! delay_ms = 1000
//!
//! [sources.messages]
//! base_url = "https://gmail.googleapis.com/gmail/v1/users/me/messages"
//! token_env = "METAINGEST_MESSAGES_TOKEN"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::collector::api::SourceKind;
use crate::core::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{message}")]
    Missing { path: PathBuf, message: String },

    #[error("{message}")]
    Read { path: PathBuf, message: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            message: message.into(),
        }
    }
}

impl crate::core::error_handling::ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        true
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            ConfigError::Missing { message, .. }
            | ConfigError::Read { message, .. }
            | ConfigError::Invalid { message } => Some(message),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Channel sizes for the progress hub
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HubConfig {
    pub publisher_capacity: usize,
    pub subscriber_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            publisher_capacity: 16,
            subscriber_capacity: 16,
        }
    }
}

/// Token-bucket parameters for one API surface
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitConfig {
    pub rate_per_sec: f64,
    pub burst: u32,
}

impl LimitConfig {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            rate_per_sec,
            burst,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub drive: LimitConfig,
    pub messages: LimitConfig,
    pub media: LimitConfig,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            drive: LimitConfig::new(10.0, 10),
            messages: LimitConfig::new(40.0, 20),
            media: LimitConfig::new(5.0, 5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub page: RetryPolicy,
    pub item: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            page: RetryPolicy::page_default(),
            item: RetryPolicy::item_default(),
        }
    }
}

/// Endpoint for a REST-backed source
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestSourceConfig {
    pub base_url: String,
    /// Environment variable holding the bearer token
    pub token_env: Option<String>,
    /// Listing page size; the provider default when unset
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    pub drive: Option<RestSourceConfig>,
    pub messages: Option<RestSourceConfig>,
    pub media: Option<RestSourceConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Bound of the per-scan item channel (the backpressure window)
    pub item_channel_capacity: usize,
    pub progress_interval_ms: u64,
    pub hub: HubConfig,
    pub limits: LimitsConfig,
    pub retry: RetryConfig,
    pub sources: SourcesConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            item_channel_capacity: 10,
            progress_interval_ms: 5000,
            hub: HubConfig::default(),
            limits: LimitsConfig::default(),
            retry: RetryConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Default config location: `<config_dir>/Metaingest/metaingest.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Metaingest").join("metaingest.toml"))
    }

    /// Load from an explicit file, else the default location if present, else defaults
    pub fn load(config_file: Option<&Path>) -> ConfigResult<Self> {
        let path = match config_file {
            Some(path) if !path.exists() => {
                return Err(ConfigError::Missing {
                    path: path.to_path_buf(),
                    message: format!("configuration file does not exist: {}", path.display()),
                });
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };

        let Some(path) = path else {
            log::debug!("No configuration file found, using defaults");
            return Ok(Self::default());
        };

        log::debug!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
            message: format!("cannot read {}: {}", path.display(), e),
            path: path.clone(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::invalid(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.item_channel_capacity == 0 {
            return Err(ConfigError::invalid("item_channel_capacity must be > 0"));
        }
        if self.progress_interval_ms == 0 {
            return Err(ConfigError::invalid("progress_interval_ms must be > 0"));
        }
        if self.hub.publisher_capacity == 0 || self.hub.subscriber_capacity == 0 {
            return Err(ConfigError::invalid("hub channel capacities must be > 0"));
        }
        for (name, limit) in [
            ("drive", &self.limits.drive),
            ("messages", &self.limits.messages),
            ("media", &self.limits.media),
        ] {
            if !(limit.rate_per_sec > 0.0) {
                return Err(ConfigError::invalid(format!(
                    "limits.{}.rate_per_sec must be > 0",
                    name
                )));
            }
            if limit.burst == 0 {
                return Err(ConfigError::invalid(format!("limits.{}.burst must be > 0", name)));
            }
        }
        if self.retry.page.max_attempts == 0 || self.retry.item.max_attempts == 0 {
            return Err(ConfigError::invalid("retry max_attempts must be > 0"));
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Rate limit for a paginated source; `None` for the filesystem
    pub fn limit_for(&self, kind: SourceKind) -> Option<&LimitConfig> {
        match kind {
            SourceKind::Filesystem => None,
            SourceKind::PagedDriveLike => Some(&self.limits.drive),
            SourceKind::PagedMessageLike => Some(&self.limits.messages),
            SourceKind::PagedMediaLike => Some(&self.limits.media),
        }
    }

    pub fn source_for(&self, kind: SourceKind) -> Option<&RestSourceConfig> {
        match kind {
            SourceKind::Filesystem => None,
            SourceKind::PagedDriveLike => self.sources.drive.as_ref(),
            SourceKind::PagedMessageLike => self.sources.messages.as_ref(),
            SourceKind::PagedMediaLike => self.sources.media.as_ref(),
        }
    }
}
