use crate::error::AlertError;
use crate::events::AlertEvent;
use log::{info, warn};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

/// Footer shown under every chat attachment
const FOOTER: &str = "Pool Watch";

/// Incoming webhooks reject attachment text much longer than this
const MAX_TEXT_BYTES: usize = 3000;

/// Outbound channel for alerts
///
/// Implementations attempt delivery exactly once per call and report the
/// outcome; retries and timeouts are the caller's concern.
pub trait Notifier: Send + Sync {
    fn notify<'a>(
        &'a self,
        alert: &'a AlertEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>>;

    /// Get a human-readable name for this channel
    fn name(&self) -> &str;
}

/// Slack incoming-webhook channel
pub struct SlackNotifier {
    client: Client,
    webhook_url: String,
}

#[derive(Debug, Serialize)]
struct SlackPayload {
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: String,
    title: String,
    text: String,
    footer: String,
    ts: i64,
}

impl SlackNotifier {
    /// Create a Slack notifier
    ///
    /// # Arguments
    /// * `webhook_url` - Incoming webhook URL
    /// * `timeout` - Request timeout for each delivery
    ///
    /// # Errors
    ///
    /// Returns `AlertError::HttpError` if the HTTP client cannot be built.
    pub fn new(webhook_url: String, timeout: Duration) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(webhook_url, client))
    }

    /// Create a Slack notifier on top of an existing HTTP client
    pub fn with_client(webhook_url: String, client: Client) -> Self {
        Self {
            client,
            webhook_url,
        }
    }

    fn format_payload(alert: &AlertEvent) -> SlackPayload {
        SlackPayload {
            attachments: vec![SlackAttachment {
                color: alert.severity.color().to_string(),
                title: alert.title.clone(),
                text: truncate_text(&alert.message, MAX_TEXT_BYTES),
                footer: FOOTER.to_string(),
                ts: alert.timestamp.timestamp(),
            }],
        }
    }
}

impl Notifier for SlackNotifier {
    fn notify<'a>(
        &'a self,
        alert: &'a AlertEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            let payload = Self::format_payload(alert);
            let response = self
                .client
                .post(&self.webhook_url)
                .json(&payload)
                .send()
                .await?;

            let status = response.status();
            if status != StatusCode::OK {
                return Err(AlertError::UnexpectedStatus(status.as_u16()));
            }

            info!("Slack alert sent: {}", alert.kind.as_str());
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "slack"
    }
}

/// Fallback channel used when no webhook is configured
///
/// Alerts are still observable in the process log.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify<'a>(
        &'a self,
        alert: &'a AlertEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            warn!(
                "No webhook configured. Alert [{}]: {}",
                alert.severity.as_str(),
                alert.message
            );
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "console"
    }
}

/// Recording notifier for tests
///
/// Keeps every alert it was asked to deliver. Can be told to fail or to
/// stall for a while before answering.
#[derive(Debug, Default)]
pub struct MockNotifier {
    delivered: Mutex<Vec<AlertEvent>>,
    fail: bool,
    delay: Option<Duration>,
}

impl MockNotifier {
    /// Create a mock that accepts every alert
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose deliveries always fail
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Delay every delivery by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Alerts received so far, in delivery order
    pub fn delivered(&self) -> Vec<AlertEvent> {
        self.delivered
            .lock()
            .map(|alerts| alerts.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.delivered.lock().map(|alerts| alerts.len()).unwrap_or(0)
    }
}

impl Notifier for MockNotifier {
    fn notify<'a>(
        &'a self,
        alert: &'a AlertEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if let Ok(mut delivered) = self.delivered.lock() {
                delivered.push(alert.clone());
            }

            if self.fail {
                Err(AlertError::NotificationFailed(
                    "mock notifier configured to fail".to_string(),
                ))
            } else {
                Ok(())
            }
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Truncate text to at most `max_length` bytes on a UTF-8 boundary
///
/// Truncated text ends with "...".
fn truncate_text(text: &str, max_length: usize) -> String {
    if text.len() <= max_length {
        return text.to_string();
    }

    let mut truncate_at = max_length.saturating_sub(3);
    while truncate_at > 0 && !text.is_char_boundary(truncate_at) {
        truncate_at -= 1;
    }
    format!("{}...", &text[..truncate_at])
}
