//! Utility modules for scout-search

pub mod retry;

pub use retry::{retry_delay_ms, retry_on_lock, RetryPolicy};
