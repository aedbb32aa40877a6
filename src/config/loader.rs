use std::{env, str::FromStr, time::Duration};

use url::Url;

use super::env::{
    AppConfig, ClassifierConfig, ConfigError, DirectoryConfig, GmailConfig, LoggingConfig,
    SchedulerConfig, SyncConfig,
};

pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me/";
pub const DEFAULT_CLASSIFIER_URL: &str = "http://localhost:5000/";

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let access_token = env::var("GMAIL_ACCESS_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("GMAIL_ACCESS_TOKEN"))?;

        let gmail = GmailConfig {
            access_token,
            api_base: parse_url("GMAIL_API_BASE", DEFAULT_GMAIL_API_BASE)?,
            unread_filter: env::var("UNREAD_FILTER")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            max_messages: parse_or("MAX_MESSAGES", 100)?,
        };

        let classifier = ClassifierConfig {
            base_url: parse_url("CLASSIFIER_URL", DEFAULT_CLASSIFIER_URL)?,
            timeout: Duration::from_millis(parse_or("CLASSIFIER_TIMEOUT_MS", 10_000u64)?),
        };

        let defaults = SyncConfig::default();
        let sync = SyncConfig {
            max_in_flight: parse_or("MAX_IN_FLIGHT", defaults.max_in_flight)?.max(1),
            fetch_retries: parse_or("FETCH_RETRIES", defaults.fetch_retries)?,
        };

        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        let scheduler = SchedulerConfig {
            cron_specs: env::var("SYNC_CRONS")
                .map(|value| split_cron_specs(&value))
                .unwrap_or_else(|_| vec!["0 */5 * * * *".to_string()]),
        };

        Ok(Self {
            gmail,
            classifier,
            sync,
            directories,
            logging,
            scheduler,
        })
    }
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            value.trim().parse::<T>().map_err(|err| ConfigError::Invalid {
                key,
                reason: err.to_string(),
            })
        }
        _ => Ok(default),
    }
}

fn parse_url(key: &'static str, default: &str) -> Result<Url, ConfigError> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    normalize_base_url(&raw).map_err(|reason| ConfigError::Invalid { key, reason })
}

/// Base URLs are joined with relative paths, so they must end with a slash.
pub fn normalize_base_url(raw: &str) -> Result<Url, String> {
    let mut value = raw.trim().to_string();
    if !value.ends_with('/') {
        value.push('/');
    }
    let url = Url::parse(&value).map_err(|err| err.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {}", url.scheme()));
    }
    Ok(url)
}

fn split_cron_specs(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}
