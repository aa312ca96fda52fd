//! Self-monitoring counters for the watcher
//!
//! Tracks how many lines were read, how many of them parsed, how many alerts
//! the engine raised or held back, and how notification delivery is going.
//! Counters are shared between the tailer thread, the ingestion loop and the
//! alert dispatcher.

use crate::triggers::Observation;
use chrono::{DateTime, Utc};
use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared pipeline counters
#[derive(Debug)]
pub struct PipelineStats {
    lines_received: AtomicU64,
    records_parsed: AtomicU64,
    parse_failures: AtomicU64,
    alerts_fired: AtomicU64,
    alerts_suppressed: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
    started_at: DateTime<Utc>,
}

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub lines_received: u64,
    pub records_parsed: u64,
    pub parse_failures: u64,
    pub alerts_fired: u64,
    pub alerts_suppressed: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub uptime_secs: i64,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

impl StatsSnapshot {
    /// Notification success rate as a percentage (0-100), 100 when nothing
    /// was attempted yet
    pub fn notification_success_rate(&self) -> f64 {
        let attempts = self.notifications_sent + self.notifications_failed;
        if attempts == 0 {
            return 100.0;
        }
        100.0 * self.notifications_sent as f64 / attempts as f64
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            lines_received: AtomicU64::new(0),
            records_parsed: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            alerts_fired: AtomicU64::new(0),
            alerts_suppressed: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    /// Record a non-blank line read from the source and whether it parsed
    pub fn record_line(&self, parsed: bool) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
        if parsed {
            self.records_parsed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.parse_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the alerts the engine fired or suppressed for one record
    pub fn record_observation(&self, observation: &Observation) {
        self.alerts_fired
            .fetch_add(observation.fired.len() as u64, Ordering::Relaxed);
        self.alerts_suppressed
            .fetch_add(observation.suppressed() as u64, Ordering::Relaxed);
    }

    /// Record the result of a notification delivery attempt
    pub fn record_notification_result(&self, success: bool) {
        if success {
            self.notifications_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.notifications_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Utc::now();
        StatsSnapshot {
            lines_received: self.lines_received.load(Ordering::Relaxed),
            records_parsed: self.records_parsed.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            alerts_fired: self.alerts_fired.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            uptime_secs: (now - self.started_at).num_seconds(),
            timestamp: now,
        }
    }

    /// Log a one-line summary of the counters
    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            "Stats: lines={} parsed={} malformed={} alerts_fired={} alerts_suppressed={} \
             notifications_sent={} notifications_failed={} ({:.1}% delivered) uptime={}s",
            s.lines_received,
            s.records_parsed,
            s.parse_failures,
            s.alerts_fired,
            s.alerts_suppressed,
            s.notifications_sent,
            s.notifications_failed,
            s.notification_success_rate(),
            s.uptime_secs
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AlertKind;

    fn observation(detected: Vec<AlertKind>, fired: Vec<AlertKind>) -> Observation {
        Observation {
            status: 200,
            pool: None,
            error_rate: 0.0,
            window_size: 1,
            window_capacity: 200,
            detected,
            fired,
        }
    }

    #[test]
    fn test_new_stats_are_zero() {
        let stats = PipelineStats::new();
        let snapshot = stats.snapshot();

        assert_eq!(snapshot.lines_received, 0);
        assert_eq!(snapshot.alerts_fired, 0);
        assert_eq!(snapshot.notification_success_rate(), 100.0);
    }

    #[test]
    fn test_line_counters() {
        let stats = PipelineStats::new();
        stats.record_line(true);
        stats.record_line(true);
        stats.record_line(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.lines_received, 3);
        assert_eq!(snapshot.records_parsed, 2);
        assert_eq!(snapshot.parse_failures, 1);
    }

    #[test]
    fn test_observation_counters() {
        let stats = PipelineStats::new();
        stats.record_observation(&observation(
            vec![AlertKind::Failover, AlertKind::HighErrorRate],
            vec![AlertKind::Failover],
        ));
        stats.record_observation(&observation(vec![], vec![]));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.alerts_fired, 1);
        assert_eq!(snapshot.alerts_suppressed, 1);
    }

    #[test]
    fn test_notification_success_rate() {
        let stats = PipelineStats::new();
        stats.record_notification_result(true);
        stats.record_notification_result(true);
        stats.record_notification_result(true);
        stats.record_notification_result(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.notifications_sent, 3);
        assert_eq!(snapshot.notifications_failed, 1);
        assert_eq!(snapshot.notification_success_rate(), 75.0);
    }
}
