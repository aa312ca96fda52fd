//! Failover detection from the pool identity carried by each request

use log::info;

/// Pool value the proxy writes when it could not tell which pool served the
/// request. It is treated exactly like a missing pool, so a backend pool that
/// is literally named "unknown" can never be tracked.
pub const UNKNOWN_POOL: &str = "unknown";

/// A change of the active pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTransition {
    pub from: String,
    pub to: String,
}

/// What the detector made of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverOutcome {
    /// Pool absent, empty or "unknown"; the record is ignored
    Ignored,
    /// First usable pool, recorded as the baseline without alerting
    Baseline(String),
    /// Same pool as before
    Unchanged,
    /// Pool differs from the last one seen
    Transition(PoolTransition),
}

/// Tracks the last observed pool and reports transitions
///
/// Starts with no baseline. The first usable pool becomes the baseline; every
/// later pool that differs is reported once and immediately becomes the new
/// baseline, whether or not the resulting alert is let through by the
/// cooldown gate.
#[derive(Debug, Clone, Default)]
pub struct FailoverDetector {
    last_pool: Option<String>,
}

impl FailoverDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a raw pool value, dropping values that carry no identity
    ///
    /// Surrounding whitespace is not part of the pool name, so `" blue"` and
    /// `"blue"` are the same pool.
    pub fn tracked_pool(pool: Option<&str>) -> Option<&str> {
        pool.map(str::trim)
            .filter(|p| !p.is_empty() && *p != UNKNOWN_POOL)
    }

    /// Feed the pool of one record into the detector
    pub fn observe(&mut self, pool: Option<&str>) -> FailoverOutcome {
        let Some(pool) = Self::tracked_pool(pool) else {
            return FailoverOutcome::Ignored;
        };

        match self.last_pool.as_deref() {
            None => {
                info!("Initial pool detected: {}", pool);
                self.last_pool = Some(pool.to_string());
                FailoverOutcome::Baseline(pool.to_string())
            }
            Some(last) if last == pool => FailoverOutcome::Unchanged,
            Some(_) => {
                let from = self.last_pool.replace(pool.to_string()).unwrap_or_default();
                FailoverOutcome::Transition(PoolTransition {
                    from,
                    to: pool.to_string(),
                })
            }
        }
    }

    /// Last pool seen, `None` until a baseline is established
    pub fn last_pool(&self) -> Option<&str> {
        self.last_pool.as_deref()
    }
}
