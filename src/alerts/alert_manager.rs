use crate::alerts::Notifier;
use crate::error::AlertError;
use crate::events::AlertEvent;
use crate::monitoring::PipelineStats;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::Runtime;

/// Messages sent to the dispatch thread
#[derive(Debug)]
enum DispatchMessage {
    Deliver(AlertEvent),
    Shutdown,
}

/// Delivers alerts on a background thread so a slow endpoint never blocks
/// ingestion
///
/// Every alert handed to [`AlertManager::dispatch`] is an owned copy taken at
/// gate-fire time. The worker delivers alerts one at a time, each bounded by
/// the configured timeout. Failures are logged and counted, never retried.
/// Alerts still queued when [`AlertManager::shutdown`] runs are abandoned.
pub struct AlertManager {
    sender: Option<Sender<DispatchMessage>>,
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    channel_name: String,
}

impl AlertManager {
    /// Start the dispatch thread
    ///
    /// # Arguments
    ///
    /// * `notifier` - Channel that performs the actual delivery
    /// * `timeout` - Upper bound for a single delivery attempt
    /// * `stats` - Counters updated with every delivery outcome
    ///
    /// # Errors
    ///
    /// Returns `AlertError::IoError` if the async runtime or the thread cannot
    /// be created.
    pub fn start(
        notifier: Arc<dyn Notifier>,
        timeout: Duration,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, AlertError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (sender, receiver) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let channel_name = notifier.name().to_string();

        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("alert-dispatch".to_string())
            .spawn(move || {
                Self::dispatch_thread(runtime, receiver, notifier, timeout, stats, thread_running);
            })?;

        info!("Alert dispatcher started (channel: {})", channel_name);
        Ok(Self {
            sender: Some(sender),
            thread_handle: Some(handle),
            running,
            channel_name,
        })
    }

    /// Queue an alert for delivery and return immediately
    ///
    /// # Errors
    ///
    /// Returns `AlertError::WorkerUnavailable` if the dispatcher was shut down.
    pub fn dispatch(&self, alert: AlertEvent) -> Result<(), AlertError> {
        let sender = self.sender.as_ref().ok_or(AlertError::WorkerUnavailable)?;
        sender
            .send(DispatchMessage::Deliver(alert))
            .map_err(|_| AlertError::WorkerUnavailable)
    }

    /// Stop the dispatch thread
    ///
    /// Waits for an in-flight delivery (bounded by the timeout) and abandons
    /// anything still queued.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(sender) = self.sender.take() {
            // The worker may already be gone; nothing to do in that case
            let _ = sender.send(DispatchMessage::Shutdown);
        }

        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                error!("Alert dispatch thread failed to join: {:?}", e);
            }
            info!("Alert dispatcher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.thread_handle.is_some()
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    fn dispatch_thread(
        runtime: Runtime,
        receiver: Receiver<DispatchMessage>,
        notifier: Arc<dyn Notifier>,
        timeout: Duration,
        stats: Arc<PipelineStats>,
        running: Arc<AtomicBool>,
    ) {
        debug!("Alert dispatch thread started");

        while let Ok(message) = receiver.recv() {
            match message {
                DispatchMessage::Deliver(alert) => {
                    if !running.load(Ordering::SeqCst) {
                        warn!("Dropping {} alert queued at shutdown", alert.kind.as_str());
                        break;
                    }
                    let outcome = runtime.block_on(Self::deliver(notifier.as_ref(), &alert, timeout));
                    match outcome {
                        Ok(()) => stats.record_notification_result(true),
                        Err(e) => {
                            error!(
                                "Failed to send {} alert via {}: {}",
                                alert.kind.as_str(),
                                notifier.name(),
                                e
                            );
                            stats.record_notification_result(false);
                        }
                    }
                }
                DispatchMessage::Shutdown => break,
            }
        }

        debug!("Alert dispatch thread stopped");
    }

    async fn deliver(
        notifier: &dyn Notifier,
        alert: &AlertEvent,
        timeout: Duration,
    ) -> Result<(), AlertError> {
        match tokio::time::timeout(timeout, notifier.notify(alert)).await {
            Ok(result) => result,
            Err(_) => Err(AlertError::Timeout(timeout)),
        }
    }
}

impl Drop for AlertManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
