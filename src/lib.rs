/// Error types for the pool watcher
pub mod error;

/// Core record and alert types
pub mod events;

/// Log followers that feed records into the engine
pub mod collectors;

/// Sliding window of recent status codes
pub mod aggregator;

/// Failover and error-rate detection
pub mod triggers;

/// Cooldown gating and notification delivery
pub mod alerts;

/// Configuration management
pub mod config;

/// Self-monitoring counters
pub mod monitoring;

// Re-export commonly used types
pub use error::{AlertError, CollectorError, ConfigError, ParseError};
pub use events::{AlertEvent, AlertKind, LogRecord, Severity};
pub use triggers::TriggerEngine;
