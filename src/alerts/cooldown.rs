use crate::events::{AlertKind, Timestamp};
use chrono::Duration;
use std::collections::HashMap;

/// Per-kind cooldown that keeps repeated alerts from spamming the channel
///
/// Each alert kind has its own timer. A kind that has never fired is always
/// allowed through; afterwards it is allowed once at least `cooldown` has
/// passed since the last successful fire. A suppressed attempt leaves the
/// timer untouched.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    /// Minimum spacing between two notifications of the same kind
    cooldown: Duration,
    /// Last time each kind was let through
    last_fired: HashMap<AlertKind, Timestamp>,
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(300) // Default: 5 minutes
    }
}

impl CooldownGate {
    /// Create a gate with the given cooldown in seconds
    pub fn new(cooldown_secs: u64) -> Self {
        let cooldown_secs = i64::try_from(cooldown_secs).unwrap_or(i64::MAX);
        Self {
            cooldown: Duration::try_seconds(cooldown_secs).unwrap_or(Duration::MAX),
            last_fired: HashMap::with_capacity(AlertKind::ALL.len()),
        }
    }

    /// Try to let an alert of `kind` through at `now`
    ///
    /// # Returns
    ///
    /// `true` if the cooldown for `kind` has elapsed (the timer is reset to
    /// `now`), `false` if the alert must be suppressed
    pub fn try_fire(&mut self, kind: AlertKind, now: Timestamp) -> bool {
        if !self.is_ready(kind, now) {
            return false;
        }
        self.last_fired.insert(kind, now);
        true
    }

    /// Check whether `kind` would be let through at `now` without recording it
    pub fn is_ready(&self, kind: AlertKind, now: Timestamp) -> bool {
        match self.last_fired.get(&kind) {
            None => true,
            Some(&last) => now - last >= self.cooldown,
        }
    }

    /// Time left before `kind` can fire again, `None` if it is ready
    pub fn remaining(&self, kind: AlertKind, now: Timestamp) -> Option<Duration> {
        let last = *self.last_fired.get(&kind)?;
        let elapsed = now - last;
        if elapsed >= self.cooldown {
            None
        } else {
            Some(self.cooldown - elapsed)
        }
    }

    /// When `kind` was last let through
    pub fn last_fired(&self, kind: AlertKind) -> Option<Timestamp> {
        self.last_fired.get(&kind).copied()
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
