use std::time::Duration;

use thiserror::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gmail: GmailConfig,
    pub classifier: ClassifierConfig,
    pub sync: SyncConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Clone)]
pub struct GmailConfig {
    pub access_token: String,
    pub api_base: Url,
    pub unread_filter: Option<String>,
    pub max_messages: usize,
}

impl std::fmt::Debug for GmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmailConfig")
            .field("access_token", &"<redacted>")
            .field("api_base", &self.api_base.as_str())
            .field("unread_filter", &self.unread_filter)
            .field("max_messages", &self.max_messages)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub max_in_flight: usize,
    pub fetch_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            fetch_retries: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub cron_specs: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
