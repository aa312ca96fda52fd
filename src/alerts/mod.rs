/// Cooldown gating, notification channels and background dispatch
pub mod alert_manager;
pub mod cooldown;
pub mod notifier;

pub use alert_manager::AlertManager;
pub use cooldown::CooldownGate;
pub use notifier::{ConsoleNotifier, MockNotifier, Notifier, SlackNotifier};
