/// Detectors and the engine that drives them
pub mod error_rate;
pub mod failover;
pub mod trigger_engine;

pub use error_rate::ErrorRateDetector;
pub use failover::{FailoverDetector, FailoverOutcome, PoolTransition, UNKNOWN_POOL};
pub use trigger_engine::{Observation, TriggerEngine};
