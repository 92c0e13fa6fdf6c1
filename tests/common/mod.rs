//! Shared helpers for the integration tests
//!
//! Graph builders and options tuned so retries and timeouts resolve in
//! milliseconds.

pub mod graphs;

pub use graphs::{host, random_graph, GraphShape};

use kbsync::SyncOptions;
use std::time::Duration;

/// Options with millisecond retry delays and a one hour cache window
pub fn fast_options() -> SyncOptions {
    SyncOptions::new("memory://")
        .with_retry_delay(Duration::from_millis(1))
        .with_retry_backoff_factor(1.0)
        .with_max_retries(2)
        .with_call_timeout(Duration::from_secs(5))
        .with_anti_entropy(Duration::from_secs(3600))
}
