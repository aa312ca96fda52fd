//! Configuration for the pool watcher
//!
//! Values come from built-in defaults, an optional TOML file and environment
//! variables, in increasing order of precedence. Call [`Config::validate`]
//! once all sources are applied.

mod env;

pub use env::{
    ENV_ALERT_COOLDOWN_SEC, ENV_ERROR_RATE_THRESHOLD, ENV_LOG_FILE, ENV_NOTIFY_TIMEOUT_SEC,
    ENV_SLACK_WEBHOOK_URL, ENV_WINDOW_SIZE,
};

use crate::error::ConfigError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the proxy access log
pub const DEFAULT_LOG_FILE: &str = "/var/log/nginx/access.log";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub detection: DetectionConfig,
    pub notifications: NotificationConfig,
    pub monitoring: MonitoringConfig,
}

/// Where the access log lives and how long to wait for it at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub log_file: PathBuf,
    pub wait_attempts: u32,
    pub wait_interval_ms: u64,
}

/// Window and alerting thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    /// Number of recent requests in the error-rate window
    pub window_size: usize,
    /// Error rate in percent above which an alert is raised
    pub error_rate_threshold: f64,
    /// Minimum spacing between two alerts of the same kind
    pub alert_cooldown_secs: i64,
}

/// Outbound notification channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    /// Slack incoming webhook; empty disables delivery
    pub webhook_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    /// How often to log pipeline counters; 0 disables the periodic summary
    pub stats_interval_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            wait_attempts: 30,
            wait_interval_ms: 1000,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_size: 200,
            error_rate_threshold: 2.0,
            alert_cooldown_secs: 300,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            timeout_secs: 10,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            stats_interval_secs: 60,
        }
    }
}

impl Config {
    /// Parse a TOML configuration file
    ///
    /// Missing sections and keys take their default values. The result is not
    /// validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from an optional file and the process environment
    ///
    /// A file that does not exist is reported and replaced by defaults; a file
    /// that exists but cannot be parsed is an error. Environment variables are
    /// applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from: {}", path.display());
                Self::from_file(path)?
            }
            Some(path) => {
                warn!(
                    "Configuration file '{}' not found, using defaults",
                    path.display()
                );
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_process_env()?;
        Ok(config)
    }

    /// Check every value is usable
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detection.window_size < 1 {
            return Err(ConfigError::ValidationError(format!(
                "window_size must be >= 1, got {}",
                self.detection.window_size
            )));
        }
        if self.detection.alert_cooldown_secs < 0 {
            return Err(ConfigError::ValidationError(format!(
                "alert_cooldown_secs must be >= 0, got {}",
                self.detection.alert_cooldown_secs
            )));
        }
        let threshold = self.detection.error_rate_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "error_rate_threshold must be a non-negative number, got {}",
                threshold
            )));
        }
        if self.notifications.timeout_secs < 1 {
            return Err(ConfigError::ValidationError(
                "notifications.timeout_secs must be >= 1".to_string(),
            ));
        }
        if self.source.wait_attempts < 1 {
            return Err(ConfigError::ValidationError(
                "source.wait_attempts must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Webhook URL if delivery is enabled
    pub fn webhook_url(&self) -> Option<&str> {
        let url = self.notifications.webhook_url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notifications.timeout_secs)
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.source.wait_interval_ms)
    }

    /// Log the effective configuration without revealing the webhook
    pub fn log_summary(&self) {
        info!("Configuration:");
        info!("   - Log file: {}", self.source.log_file.display());
        info!(
            "   - Error rate threshold: {}%",
            self.detection.error_rate_threshold
        );
        info!("   - Window size: {} requests", self.detection.window_size);
        info!("   - Alert cooldown: {}s", self.detection.alert_cooldown_secs);
        info!(
            "   - Slack webhook: {}",
            if self.webhook_url().is_some() {
                "configured"
            } else {
                "NOT configured"
            }
        );
    }
}
