//! Core record and alert types for the pool watcher
//!
//! This module defines the record produced for each access log line and the
//! alert events raised by the detectors.

use crate::error::ParseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Title shared by every alert sent to the notification channel
pub const ALERT_TITLE: &str = "Blue/Green Deployment Alert";

/// One request observed in the reverse proxy access log
///
/// Produced once per line and consumed immediately by the engine; only the
/// status code outlives the call, inside the sliding window.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogRecord {
    /// HTTP status returned to the client
    pub status: u16,
    /// Backend pool that served the request (e.g. "blue", "green")
    pub pool: Option<String>,
    /// Release identifier reported by the upstream
    pub release: Option<String>,
    /// Raw upstream status string, may hold several comma separated codes
    pub upstream_status: Option<String>,
}

/// Wire shape of an access log line; unknown fields are ignored
#[derive(Debug, Deserialize)]
struct RawLogLine {
    status: Option<StatusValue>,
    #[serde(default)]
    pool: Option<String>,
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    upstream_status: Option<String>,
}

/// Proxies emit `status` either as a number or as a quoted number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatusValue {
    Number(i64),
    Text(String),
}

impl StatusValue {
    fn to_code(&self) -> Result<u16, ParseError> {
        let code = match self {
            StatusValue::Number(n) => *n,
            StatusValue::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| ParseError::InvalidStatus(s.clone()))?,
        };
        u16::try_from(code).map_err(|_| ParseError::InvalidStatus(code.to_string()))
    }
}

impl LogRecord {
    /// Create a record with only a status and pool, mostly useful in tests
    pub fn new(status: u16, pool: Option<&str>) -> Self {
        Self {
            status,
            pool: pool.map(str::to_string),
            release: None,
            upstream_status: None,
        }
    }

    /// Parse a single JSON access log line
    ///
    /// # Errors
    ///
    /// Returns `ParseError::InvalidJson` for lines that are not a JSON object
    /// of the expected shape and `ParseError::InvalidStatus` when `status` is
    /// missing or not an integer in the HTTP range.
    pub fn from_json(line: &str) -> Result<Self, ParseError> {
        let raw: RawLogLine = serde_json::from_str(line)?;
        let status = raw
            .status
            .as_ref()
            .ok_or_else(|| ParseError::InvalidStatus("missing".to_string()))?
            .to_code()?;

        Ok(Self {
            status,
            pool: raw.pool,
            release: raw.release,
            upstream_status: raw.upstream_status,
        })
    }
}

/// Kinds of alerts the engine can raise
///
/// Each kind has its own cooldown timer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// The active backend pool changed
    Failover,
    /// Rolling 5xx rate went above the configured threshold
    HighErrorRate,
}

impl AlertKind {
    pub const ALL: [AlertKind; 2] = [AlertKind::Failover, AlertKind::HighErrorRate];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Failover => "failover",
            AlertKind::HighErrorRate => "high_error_rate",
        }
    }
}

/// Severity of an alert, mapped onto the notification color
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, no action required
    Info,
    /// May require attention
    Warning,
    /// Requires immediate attention
    Danger,
    /// Recovery or all-clear
    Good,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
            Severity::Good => "good",
        }
    }

    /// Hex color used by chat attachments
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Danger => "#ff0000",
            Severity::Warning => "#ff9900",
            Severity::Good => "#00ff00",
            Severity::Info => "#0099ff",
        }
    }
}

/// An alert that passed the cooldown gate
///
/// Owned data only, so a copy can be handed to the dispatch worker without
/// sharing anything with the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    /// When the alert was gated through
    pub timestamp: Timestamp,
}

impl AlertEvent {
    /// Build the failover alert for a pool transition
    pub fn failover(previous: &str, current: &str, at: Timestamp) -> Self {
        let message = format!(
            "**Failover Detected!**\n\
             Pool changed: `{previous}` → `{current}`\n\
             Time: {}\n\
             Action: Check health of `{previous}` container",
            format_time(at)
        );

        Self {
            kind: AlertKind::Failover,
            title: ALERT_TITLE.to_string(),
            message,
            severity: Severity::Danger,
            timestamp: at,
        }
    }

    /// Build the high error rate alert
    pub fn high_error_rate(rate: f64, threshold: f64, window_size: usize, at: Timestamp) -> Self {
        let message = format!(
            "**High Error Rate Detected!**\n\
             Error rate: `{rate:.2}%` (threshold: {threshold:?}%)\n\
             Window size: {window_size} requests\n\
             Time: {}\n\
             Action: Investigate upstream services",
            format_time(at)
        );

        Self {
            kind: AlertKind::HighErrorRate,
            title: ALERT_TITLE.to_string(),
            message,
            severity: Severity::Warning,
            timestamp: at,
        }
    }
}

fn format_time(at: Timestamp) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_parse_full_line() {
        let line = r#"{"time":"2025-03-14T09:26:53+00:00","status":502,"pool":"blue","release":"blue-v1.2","upstream_status":"502, 200"}"#;
        let record = LogRecord::from_json(line).unwrap();

        assert_eq!(record.status, 502);
        assert_eq!(record.pool.as_deref(), Some("blue"));
        assert_eq!(record.release.as_deref(), Some("blue-v1.2"));
        assert_eq!(record.upstream_status.as_deref(), Some("502, 200"));
    }

    #[test]
    fn test_parse_status_as_string() {
        let record = LogRecord::from_json(r#"{"status":"404","pool":"green"}"#).unwrap();
        assert_eq!(record.status, 404);
    }

    #[test]
    fn test_parse_optional_fields_absent() {
        let record = LogRecord::from_json(r#"{"status":200}"#).unwrap();
        assert_eq!(record, LogRecord::new(200, None));
    }

    #[test]
    fn test_parse_null_pool() {
        let record = LogRecord::from_json(r#"{"status":200,"pool":null}"#).unwrap();
        assert_eq!(record.pool, None);
    }

    #[test]
    fn test_parse_rejects_missing_status() {
        let err = LogRecord::from_json(r#"{"pool":"blue"}"#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidStatus(_)));
    }

    #[test]
    fn test_parse_rejects_non_numeric_status() {
        let err = LogRecord::from_json(r#"{"status":"ok"}"#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidStatus(_)));

        let err = LogRecord::from_json(r#"{"status":-1}"#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidStatus(_)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            LogRecord::from_json("GET / HTTP/1.1 200").unwrap_err(),
            ParseError::InvalidJson(_)
        ));
        assert!(LogRecord::from_json("[1,2,3]").is_err());
    }

    #[test]
    fn test_failover_alert_message() {
        let alert = AlertEvent::failover("blue", "green", at());

        assert_eq!(alert.kind, AlertKind::Failover);
        assert_eq!(alert.severity, Severity::Danger);
        assert_eq!(alert.title, ALERT_TITLE);
        assert!(alert.message.contains("Pool changed: `blue` → `green`"));
        assert!(alert.message.contains("Time: 2025-03-14 09:26:53"));
        assert!(alert.message.contains("Check health of `blue`"));
    }

    #[test]
    fn test_high_error_rate_alert_message() {
        let alert = AlertEvent::high_error_rate(200.0 / 3.0, 50.0, 3, at());

        assert_eq!(alert.kind, AlertKind::HighErrorRate);
        assert_eq!(alert.severity, Severity::Warning);
        assert!(alert.message.contains("Error rate: `66.67%` (threshold: 50.0%)"));
        assert!(alert.message.contains("Window size: 3 requests"));
        assert!(alert.message.contains("Investigate upstream services"));
    }

    #[test]
    fn test_high_error_rate_threshold_keeps_decimal() {
        let alert = AlertEvent::high_error_rate(10.0, 2.0, 200, at());
        assert!(alert.message.contains("(threshold: 2.0%)"));

        let alert = AlertEvent::high_error_rate(10.0, 2.5, 200, at());
        assert!(alert.message.contains("(threshold: 2.5%)"));
    }

    #[test]
    fn test_severity_colors() {
        assert_eq!(Severity::Danger.color(), "#ff0000");
        assert_eq!(Severity::Warning.color(), "#ff9900");
        assert_eq!(Severity::Good.color(), "#00ff00");
        assert_eq!(Severity::Info.color(), "#0099ff");
    }

    #[test]
    fn test_severity_serialization() {
        assert_eq!(
            serde_json::to_string(&Severity::Danger).unwrap(),
            "\"danger\""
        );
        assert_eq!(
            serde_json::to_string(&AlertKind::HighErrorRate).unwrap(),
            "\"high_error_rate\""
        );
    }
}
