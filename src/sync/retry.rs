//! Per-chunk retry policy

use crate::store::StoreError;
use std::time::Duration;

/// How a failing chunk push is retried.
///
/// The delay after attempt `n` (0-indexed) is `base_delay * backoff_factor^n`.
/// With the default factor of 1.01 growth is nearly linear.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Total attempts a chunk gets: the initial try plus every retry
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Delay to wait after attempt `attempt` fails
    pub fn delay(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scale = self.backoff_factor.max(0.0).powi(exponent);
        Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * scale).unwrap_or(Duration::MAX)
    }

    /// Whether a failed attempt should be followed by another one
    pub fn should_retry(&self, attempt: usize, error: &StoreError) -> bool {
        attempt < self.max_retries && error.is_transient()
    }
}
