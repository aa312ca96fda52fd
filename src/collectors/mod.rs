/// Access log follower backed by a `tail` subprocess
pub mod log_tailer;

pub use log_tailer::{wait_for_source, LogTailer, SourceStatus};
