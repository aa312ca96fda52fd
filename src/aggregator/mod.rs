//! Fixed-capacity window of recent status codes and the rate derived from it

pub mod window;

pub use window::{error_rate, is_server_error, SlidingWindow};
