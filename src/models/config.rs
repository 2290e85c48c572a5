//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote CMS connection settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Where exports live and how they are interpreted
    #[serde(default)]
    pub export: ExportConfig,

    /// Delays between remote calls
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Back-off policy for rate-limited calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Attachment upload limits
    #[serde(default)]
    pub upload: UploadConfig,

    /// Manifest persistence
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.api.user_agent.trim().is_empty() {
            return Err(AppError::validation("api.user_agent is empty"));
        }
        if self.api.timeout_secs == 0 {
            return Err(AppError::validation("api.timeout_secs must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::validation("retry.max_attempts must be > 0"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(AppError::validation("retry.multiplier must be >= 1"));
        }
        if self.upload.max_file_bytes == 0 {
            return Err(AppError::validation("upload.max_file_bytes must be > 0"));
        }
        Ok(())
    }

    /// Validate the settings needed to talk to a real remote.
    pub fn validate_remote(&self) -> Result<()> {
        self.validate()?;
        if self.api.url.trim().is_empty() {
            return Err(AppError::validation("api.url is empty"));
        }
        if self.api.token_id.is_empty() || self.api.token_secret.is_empty() {
            return Err(AppError::validation("api token id/secret are required"));
        }
        Ok(())
    }

    /// Directory of one export inside the export root.
    pub fn export_dir(&self, export_id: &str) -> PathBuf {
        self.export.root.join(export_id)
    }
}

/// Remote CMS connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base API URL, e.g. `https://wiki.example.org/api`
    #[serde(default)]
    pub url: String,

    /// API token id
    #[serde(default)]
    pub token_id: String,

    /// API token secret
    #[serde(default)]
    pub token_secret: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token_id: String::new(),
            token_secret: String::new(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Export location settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Folder holding one sub-directory per export
    #[serde(default = "defaults::export_root")]
    pub root: PathBuf,

    /// Title fragment identifying the root page of an XML dump
    #[serde(default)]
    pub xml_root_marker: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            root: defaults::export_root(),
            xml_root_marker: None,
        }
    }
}

/// Inter-item delays in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "defaults::container_delay")]
    pub shelf_delay_ms: u64,
    #[serde(default = "defaults::container_delay")]
    pub book_delay_ms: u64,
    #[serde(default = "defaults::container_delay")]
    pub chapter_delay_ms: u64,
    #[serde(default = "defaults::page_delay")]
    pub page_delay_ms: u64,
    #[serde(default = "defaults::container_delay")]
    pub upload_delay_ms: u64,
    #[serde(default = "defaults::link_fix_delay")]
    pub link_fix_delay_ms: u64,
}

impl PacingConfig {
    /// No pacing at all; used for dry runs and tests.
    pub fn none() -> Self {
        Self {
            shelf_delay_ms: 0,
            book_delay_ms: 0,
            chapter_delay_ms: 0,
            page_delay_ms: 0,
            upload_delay_ms: 0,
            link_fix_delay_ms: 0,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            shelf_delay_ms: defaults::container_delay(),
            book_delay_ms: defaults::container_delay(),
            chapter_delay_ms: defaults::container_delay(),
            page_delay_ms: defaults::page_delay(),
            upload_delay_ms: defaults::container_delay(),
            link_fix_delay_ms: defaults::link_fix_delay(),
        }
    }
}

/// Back-off settings shared by every remote call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "defaults::multiplier")]
    pub multiplier: f64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay(),
            multiplier: defaults::multiplier(),
        }
    }
}

/// Attachment upload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Files above this size are skipped
    #[serde(default = "defaults::max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: defaults::max_file_bytes(),
        }
    }
}

/// Manifest storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding every export's attachment manifest
    #[serde(default = "defaults::manifest_path")]
    pub manifest_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            manifest_path: defaults::manifest_path(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Api defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; migrator/0.1)".into()
    }
    pub fn timeout() -> u64 {
        60
    }

    // Export defaults
    pub fn export_root() -> PathBuf {
        PathBuf::from("./import")
    }

    // Pacing defaults
    pub fn container_delay() -> u64 {
        100
    }
    pub fn page_delay() -> u64 {
        600
    }
    pub fn link_fix_delay() -> u64 {
        300
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        5
    }
    pub fn base_delay() -> u64 {
        300
    }
    pub fn multiplier() -> f64 {
        2.0
    }

    // Upload defaults
    pub fn max_file_bytes() -> u64 {
        50 * 1024 * 1024
    }

    // Storage defaults
    pub fn manifest_path() -> PathBuf {
        PathBuf::from("attachments.json")
    }
}
