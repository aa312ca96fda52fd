//! Environment variable overrides

use super::Config;
use crate::error::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;

pub const ENV_SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";
pub const ENV_ERROR_RATE_THRESHOLD: &str = "ERROR_RATE_THRESHOLD";
pub const ENV_WINDOW_SIZE: &str = "WINDOW_SIZE";
pub const ENV_ALERT_COOLDOWN_SEC: &str = "ALERT_COOLDOWN_SEC";
pub const ENV_LOG_FILE: &str = "LOG_FILE";
pub const ENV_NOTIFY_TIMEOUT_SEC: &str = "NOTIFY_TIMEOUT_SEC";

impl Config {
    /// Apply overrides from the process environment
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` to read variables
    ///
    /// Numeric variables that are set but blank are ignored. The webhook URL
    /// is taken as-is, so an empty value disables delivery.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EnvError` for a value that does not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SLACK_WEBHOOK_URL) {
            self.notifications.webhook_url = url;
        }
        if let Some(path) = lookup(ENV_LOG_FILE).filter(|v| !v.trim().is_empty()) {
            self.source.log_file = PathBuf::from(path);
        }
        if let Some(value) = parse_var(&lookup, ENV_ERROR_RATE_THRESHOLD)? {
            self.detection.error_rate_threshold = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_WINDOW_SIZE)? {
            self.detection.window_size = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_ALERT_COOLDOWN_SEC)? {
            self.detection.alert_cooldown_secs = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_NOTIFY_TIMEOUT_SEC)? {
            self.notifications.timeout_secs = value;
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse().map(Some).map_err(|_| ConfigError::EnvError {
        key: key.to_string(),
        value: raw.clone(),
    })
}
