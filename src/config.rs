use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GmailError, Result};
use crate::report::ReportFormat;

/// Largest page the Gmail API will return from `users.messages.list`
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Maximum pages to list; 0 walks the whole mailbox
    #[serde(default)]
    pub max_pages: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Gmail search query restricting which messages are listed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Detail fetches in flight within a single page
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_pages: 0,
            page_size: default_page_size(),
            query: None,
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Retries per API call for transient failures; 0 aborts on the first failure
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_top")]
    pub top: usize,
    #[serde(default)]
    pub format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top: default_top(),
            format: ReportFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Allow the browser consent flow when no usable token is cached
    #[serde(default = "default_interactive")]
    pub interactive: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            interactive: default_interactive(),
        }
    }
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_concurrency() -> usize {
    1
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_secs() -> u64 {
    30
}

fn default_top() -> usize {
    10
}

fn default_interactive() -> bool {
    true
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GmailError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scan.page_size == 0 {
            return Err(GmailError::ConfigError(
                "scan.page_size must be at least 1".to_string(),
            ));
        }
        if self.scan.page_size > MAX_PAGE_SIZE {
            return Err(GmailError::ConfigError(format!(
                "scan.page_size cannot exceed {} (Gmail API maximum)",
                MAX_PAGE_SIZE
            )));
        }

        if self.scan.concurrency == 0 {
            return Err(GmailError::ConfigError(
                "scan.concurrency must be at least 1".to_string(),
            ));
        }
        if self.scan.concurrency > 50 {
            return Err(GmailError::ConfigError(
                "scan.concurrency cannot exceed 50 (to stay under Gmail API rate limits of 250 units/sec)".to_string(),
            ));
        }

        if let Some(query) = &self.scan.query {
            if query.trim().is_empty() {
                return Err(GmailError::ConfigError(
                    "scan.query cannot be blank; omit it to list every message".to_string(),
                ));
            }
        }

        if self.fetch.max_retries > 10 {
            return Err(GmailError::ConfigError(
                "fetch.max_retries cannot exceed 10".to_string(),
            ));
        }
        if self.fetch.initial_backoff_ms == 0 {
            return Err(GmailError::ConfigError(
                "fetch.initial_backoff_ms must be greater than 0".to_string(),
            ));
        }
        if self.fetch.max_backoff_secs == 0 {
            return Err(GmailError::ConfigError(
                "fetch.max_backoff_secs must be greater than 0".to_string(),
            ));
        }

        if self.report.top == 0 {
            return Err(GmailError::ConfigError(
                "report.top must be at least 1".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
