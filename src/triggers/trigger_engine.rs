use crate::aggregator::SlidingWindow;
use crate::alerts::CooldownGate;
use crate::config::DetectionConfig;
use crate::events::{AlertEvent, AlertKind, LogRecord, Timestamp};
use crate::triggers::{ErrorRateDetector, FailoverDetector, FailoverOutcome};
use log::{debug, info};

/// Stream analysis engine for the proxy access log
///
/// Owns the sliding window, both detectors and the cooldown gate. Records are
/// fed one at a time through [`TriggerEngine::observe`], which fully processes
/// a record before returning; alerts that pass the gate are queued until the
/// caller drains them with [`TriggerEngine::take_pending_alerts`].
///
/// The engine has no interior locking. Feeding it from more than one source
/// requires a single owner (or a mutex) in front of it so the window, the
/// last pool and the cooldown timers all follow the log's append order.
#[derive(Debug)]
pub struct TriggerEngine {
    window: SlidingWindow,
    failover: FailoverDetector,
    error_rate: ErrorRateDetector,
    gate: CooldownGate,
    pending: Vec<AlertEvent>,
}

/// Summary of what the engine did with one record
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub status: u16,
    /// Pool as written in the record, including "unknown"
    pub pool: Option<String>,
    pub error_rate: f64,
    pub window_size: usize,
    pub window_capacity: usize,
    /// Alert conditions detected for this record
    pub detected: Vec<AlertKind>,
    /// Subset of `detected` that passed the cooldown gate
    pub fired: Vec<AlertKind>,
}

impl Observation {
    /// Detected conditions whose notification was held back by the cooldown
    pub fn suppressed(&self) -> usize {
        self.detected.len() - self.fired.len()
    }
}

impl TriggerEngine {
    /// Create an engine
    ///
    /// # Arguments
    ///
    /// * `window_size` - Number of recent requests in the error-rate window
    /// * `error_rate_threshold` - Alert when the 5xx percentage is above this
    /// * `cooldown_secs` - Minimum spacing between alerts of the same kind
    pub fn new(window_size: usize, error_rate_threshold: f64, cooldown_secs: u64) -> Self {
        Self {
            window: SlidingWindow::new(window_size),
            failover: FailoverDetector::new(),
            error_rate: ErrorRateDetector::new(error_rate_threshold),
            gate: CooldownGate::new(cooldown_secs),
            pending: Vec::new(),
        }
    }

    /// Create an engine from validated detection settings
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            config.window_size,
            config.error_rate_threshold,
            config.alert_cooldown_secs.max(0) as u64,
        )
    }

    /// Process one record
    ///
    /// Pushes the status into the window, runs the failover detector and then
    /// the error-rate detector, and gates every detection through the
    /// cooldown. Alerts that pass are queued for [`Self::take_pending_alerts`].
    pub fn observe(&mut self, record: &LogRecord, now: Timestamp) -> Observation {
        self.window.push(record.status);

        let mut detected = Vec::new();
        let mut fired = Vec::new();

        if let FailoverOutcome::Transition(transition) =
            self.failover.observe(record.pool.as_deref())
        {
            detected.push(AlertKind::Failover);
            if self.gate.try_fire(AlertKind::Failover, now) {
                info!("Failover: {} → {}", transition.from, transition.to);
                self.pending
                    .push(AlertEvent::failover(&transition.from, &transition.to, now));
                fired.push(AlertKind::Failover);
            } else {
                info!(
                    "Failover detected ({} → {}) but in cooldown period ({}s left)",
                    transition.from,
                    transition.to,
                    self.cooldown_remaining_secs(AlertKind::Failover, now)
                );
            }
        }

        if let Some(rate) = self.error_rate.evaluate(&self.window) {
            detected.push(AlertKind::HighErrorRate);
            if self.gate.try_fire(AlertKind::HighErrorRate, now) {
                info!("High error rate: {:.2}%", rate);
                self.pending.push(AlertEvent::high_error_rate(
                    rate,
                    self.error_rate.threshold(),
                    self.window.capacity(),
                    now,
                ));
                fired.push(AlertKind::HighErrorRate);
            } else {
                info!(
                    "High error rate ({:.2}%) but in cooldown period ({}s left)",
                    rate,
                    self.cooldown_remaining_secs(AlertKind::HighErrorRate, now)
                );
            }
        }

        let observation = Observation {
            status: record.status,
            pool: record.pool.clone(),
            error_rate: self.window.error_rate(),
            window_size: self.window.size(),
            window_capacity: self.window.capacity(),
            detected,
            fired,
        };

        debug!(
            "[{}] Status: {} | Error Rate: {:.2}% | Window: {}/{}",
            observation.pool.as_deref().unwrap_or("unknown"),
            observation.status,
            observation.error_rate,
            observation.window_size,
            observation.window_capacity
        );

        observation
    }

    /// Drain alerts that passed the cooldown gate, oldest first
    pub fn take_pending_alerts(&mut self) -> Vec<AlertEvent> {
        std::mem::take(&mut self.pending)
    }

    fn cooldown_remaining_secs(&self, kind: AlertKind, now: Timestamp) -> i64 {
        self.gate
            .remaining(kind, now)
            .map_or(0, |left| left.num_seconds())
    }

    pub fn last_pool(&self) -> Option<&str> {
        self.failover.last_pool()
    }

    pub fn error_rate(&self) -> f64 {
        self.window.error_rate()
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn cooldown_gate(&self) -> &CooldownGate {
        &self.gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Severity;
    use chrono::{Duration, TimeZone, Utc};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
    }

    fn status(code: u16) -> LogRecord {
        LogRecord::new(code, None)
    }

    fn pool(name: &str) -> LogRecord {
        LogRecord::new(200, Some(name))
    }

    #[test]
    fn test_scenario_a_error_rate_fires_when_window_full() {
        let mut engine = TriggerEngine::new(3, 50.0, 0);

        for code in [200, 200, 200] {
            let obs = engine.observe(&status(code), t0());
            assert!(obs.detected.is_empty());
        }

        let obs = engine.observe(&status(500), t0());
        assert_eq!(engine.window().snapshot(), vec![200, 200, 500]);
        assert!((obs.error_rate - 100.0 / 3.0).abs() < 1e-9);
        assert!(obs.fired.is_empty());

        let obs = engine.observe(&status(500), t0());
        assert_eq!(engine.window().snapshot(), vec![200, 500, 500]);
        assert!((obs.error_rate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(obs.fired, vec![AlertKind::HighErrorRate]);

        let alerts = engine.take_pending_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::HighErrorRate);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert!(alerts[0].message.contains("66.67%"));
        assert!(alerts[0].message.contains("Window size: 3 requests"));
    }

    #[test]
    fn test_scenario_b_failover_after_baseline() {
        let mut engine = TriggerEngine::new(200, 2.0, 0);

        assert!(engine.observe(&pool("blue"), t0()).detected.is_empty());
        assert_eq!(engine.last_pool(), Some("blue"));
        assert!(engine.observe(&pool("blue"), t0()).detected.is_empty());

        let obs = engine.observe(&pool("green"), t0());
        assert_eq!(obs.fired, vec![AlertKind::Failover]);
        assert_eq!(engine.last_pool(), Some("green"));

        let alerts = engine.take_pending_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Danger);
        assert!(alerts[0].message.contains("`blue` → `green`"));
    }

    #[test]
    fn test_scenario_c_unknown_pool_does_not_become_baseline() {
        let mut engine = TriggerEngine::new(200, 2.0, 0);

        engine.observe(&pool("unknown"), t0());
        assert_eq!(engine.last_pool(), None);

        let obs = engine.observe(&pool("green"), t0());
        assert!(obs.detected.is_empty());
        assert_eq!(engine.last_pool(), Some("green"));
        assert!(engine.take_pending_alerts().is_empty());

        // Both records still fed the window
        assert_eq!(engine.window().size(), 2);
    }

    #[test]
    fn test_scenario_d_second_failover_suppressed_but_tracked() {
        let mut engine = TriggerEngine::new(200, 2.0, 300);

        engine.observe(&pool("blue"), t0());
        let first = engine.observe(&pool("green"), t0());
        assert_eq!(first.fired, vec![AlertKind::Failover]);

        let second = engine.observe(&pool("blue"), t0() + Duration::seconds(1));
        assert_eq!(second.detected, vec![AlertKind::Failover]);
        assert!(second.fired.is_empty());
        assert_eq!(second.suppressed(), 1);
        assert_eq!(engine.last_pool(), Some("blue"));

        let alerts = engine.take_pending_alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("`blue` → `green`"));
    }

    #[test]
    fn test_suppressed_failover_is_not_reannounced_after_cooldown() {
        let mut engine = TriggerEngine::new(200, 2.0, 300);

        engine.observe(&pool("blue"), t0());
        engine.observe(&pool("green"), t0());
        engine.observe(&pool("blue"), t0() + Duration::seconds(1));
        engine.take_pending_alerts();

        // Cooldown elapsed, but "blue" is already the tracked pool
        let obs = engine.observe(&pool("blue"), t0() + Duration::seconds(600));
        assert!(obs.detected.is_empty());
        assert!(engine.take_pending_alerts().is_empty());
    }

    #[test]
    fn test_error_rate_cooldown_and_refire() {
        let mut engine = TriggerEngine::new(2, 10.0, 60);

        engine.observe(&status(500), t0());
        let obs = engine.observe(&status(500), t0());
        assert_eq!(obs.fired, vec![AlertKind::HighErrorRate]);

        let obs = engine.observe(&status(500), t0() + Duration::seconds(30));
        assert_eq!(obs.detected, vec![AlertKind::HighErrorRate]);
        assert!(obs.fired.is_empty());

        let obs = engine.observe(&status(500), t0() + Duration::seconds(60));
        assert_eq!(obs.fired, vec![AlertKind::HighErrorRate]);

        assert_eq!(engine.take_pending_alerts().len(), 2);
    }

    #[test]
    fn test_failover_and_error_rate_have_separate_timers() {
        let mut engine = TriggerEngine::new(1, 50.0, 300);

        engine.observe(&LogRecord::new(200, Some("blue")), t0());
        let obs = engine.observe(&LogRecord::new(503, Some("green")), t0());

        assert_eq!(
            obs.fired,
            vec![AlertKind::Failover, AlertKind::HighErrorRate]
        );
        let kinds: Vec<_> = engine
            .take_pending_alerts()
            .into_iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(kinds, vec![AlertKind::Failover, AlertKind::HighErrorRate]);
    }

    #[test]
    fn test_take_pending_alerts_drains() {
        let mut engine = TriggerEngine::new(200, 2.0, 0);
        engine.observe(&pool("blue"), t0());
        engine.observe(&pool("green"), t0());

        assert_eq!(engine.take_pending_alerts().len(), 1);
        assert!(engine.take_pending_alerts().is_empty());
    }

    #[test]
    fn test_from_config() {
        let config = DetectionConfig {
            window_size: 5,
            error_rate_threshold: 20.0,
            alert_cooldown_secs: 10,
        };
        let engine = TriggerEngine::from_config(&config);

        assert_eq!(engine.window().capacity(), 5);
        assert_eq!(engine.cooldown_gate().cooldown(), Duration::seconds(10));
    }
}
