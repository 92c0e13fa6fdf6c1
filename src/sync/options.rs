//! Construction-time options and the resolved commit policy

use super::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PARALLELIZATION: usize = 30;
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_MAX_RETRIES: usize = 10;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRY_BACKOFF_FACTOR: f64 = 1.01;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid option: {0}")]
    Invalid(String),
}

/// How the session trusts its cached copy of the remote graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Trust the cache until a jittered deadline derived from the
    /// anti-entropy duration. A zero duration re-reads every cycle.
    #[default]
    AntiEntropy,
    /// Re-read the remote graph on every transaction
    AlwaysRefresh,
}

/// Options for a synchronization session.
///
/// Numeric options left at zero take their default when resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Base URL of the graph store
    pub url: String,
    /// Bearer token for this data source
    pub auth_token: String,
    /// Skip TLS certificate verification
    pub skip_verify: bool,
    /// Number of store calls in flight at once (default 30)
    pub parallelization: usize,
    /// Elements per store call (default 1000)
    pub chunk_size: usize,
    /// Retries per chunk before giving up (default 10)
    pub max_retries: usize,
    /// Base delay between retries in milliseconds (default 5000)
    pub retry_delay_ms: u64,
    /// Multiplier applied to the delay for each retry (default 1.01)
    pub retry_backoff_factor: f64,
    /// How long the cached graph is trusted, in seconds (0 disables caching)
    pub anti_entropy_secs: u64,
    /// Timeout for one store call in milliseconds (default 60000)
    pub call_timeout_ms: u64,
    pub cache_mode: CacheMode,
}

impl SyncOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let options: SyncOptions = serde_yaml::from_str(yaml)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Reject values no default can stand in for
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.retry_backoff_factor.is_finite() || self.retry_backoff_factor < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "retry_backoff_factor must be a non-negative number, got {}",
                self.retry_backoff_factor
            )));
        }
        Ok(())
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = token.into();
        self
    }

    pub fn with_skip_verify(mut self, skip_verify: bool) -> Self {
        self.skip_verify = skip_verify;
        self
    }

    pub fn with_parallelization(mut self, parallelization: usize) -> Self {
        self.parallelization = parallelization;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = ceil_millis(delay);
        self
    }

    pub fn with_retry_backoff_factor(mut self, factor: f64) -> Self {
        self.retry_backoff_factor = factor;
        self
    }

    /// Cache window, rounded up to whole seconds; zero disables caching
    pub fn with_anti_entropy(mut self, duration: Duration) -> Self {
        self.anti_entropy_secs = duration.as_secs().saturating_add(u64::from(duration.subsec_nanos() > 0));
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = ceil_millis(timeout);
        self
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Overlay every non-default value of `other` onto these options
    pub fn merge(mut self, other: &SyncOptions) -> Self {
        if !other.url.is_empty() {
            self.url = other.url.clone();
        }
        if !other.auth_token.is_empty() {
            self.auth_token = other.auth_token.clone();
        }
        self.skip_verify |= other.skip_verify;
        if other.parallelization != 0 {
            self.parallelization = other.parallelization;
        }
        if other.chunk_size != 0 {
            self.chunk_size = other.chunk_size;
        }
        if other.max_retries != 0 {
            self.max_retries = other.max_retries;
        }
        if other.retry_delay_ms != 0 {
            self.retry_delay_ms = other.retry_delay_ms;
        }
        if other.retry_backoff_factor != 0.0 {
            self.retry_backoff_factor = other.retry_backoff_factor;
        }
        if other.anti_entropy_secs != 0 {
            self.anti_entropy_secs = other.anti_entropy_secs;
        }
        if other.call_timeout_ms != 0 {
            self.call_timeout_ms = other.call_timeout_ms;
        }
        if other.cache_mode != CacheMode::default() {
            self.cache_mode = other.cache_mode;
        }
        self
    }

    /// The cache window; `None` when every transaction must re-read
    pub fn anti_entropy(&self) -> Option<Duration> {
        match self.cache_mode {
            CacheMode::AlwaysRefresh => None,
            CacheMode::AntiEntropy if self.anti_entropy_secs == 0 => None,
            CacheMode::AntiEntropy => Some(Duration::from_secs(self.anti_entropy_secs)),
        }
    }

    /// Apply defaults to every option left at zero
    pub fn resolve(&self) -> CommitPolicy {
        fn or<T: PartialEq + Default>(value: T, default: T) -> T {
            if value == T::default() {
                default
            } else {
                value
            }
        }

        CommitPolicy {
            parallelization: or(self.parallelization, DEFAULT_PARALLELIZATION),
            chunk_size: or(self.chunk_size, DEFAULT_CHUNK_SIZE),
            retry: RetryPolicy {
                max_retries: or(self.max_retries, DEFAULT_MAX_RETRIES),
                base_delay: or(Duration::from_millis(self.retry_delay_ms), DEFAULT_RETRY_DELAY),
                backoff_factor: or(self.retry_backoff_factor, DEFAULT_RETRY_BACKOFF_FACTOR),
            },
            call_timeout: or(Duration::from_millis(self.call_timeout_ms), DEFAULT_CALL_TIMEOUT),
        }
    }
}

/// Whole milliseconds in `duration`, rounded up so a non-zero duration never
/// collapses to the zero that means "use the default"
fn ceil_millis(duration: Duration) -> u64 {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    if duration.subsec_nanos() % 1_000_000 > 0 {
        millis.saturating_add(1)
    } else {
        millis
    }
}

/// Fully resolved settings a transaction commits with
#[derive(Debug, Clone, PartialEq)]
pub struct CommitPolicy {
    pub parallelization: usize,
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    pub call_timeout: Duration,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        SyncOptions::default().resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn zero_values_take_defaults() {
        let policy = SyncOptions::default().resolve();
        assert_eq!(policy.parallelization, 30);
        assert_eq!(policy.chunk_size, 1000);
        assert_eq!(policy.retry.max_retries, 10);
        assert_eq!(policy.retry.base_delay, Duration::from_secs(5));
        assert_eq!(policy.retry.backoff_factor, 1.01);
        assert_eq!(policy.call_timeout, Duration::from_secs(60));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let policy = SyncOptions::new("http://kb")
            .with_parallelization(2)
            .with_chunk_size(10)
            .with_max_retries(3)
            .with_retry_delay(Duration::from_millis(20))
            .with_retry_backoff_factor(2.0)
            .resolve();
        assert_eq!(policy.parallelization, 2);
        assert_eq!(policy.chunk_size, 10);
        assert_eq!(policy.retry.max_retries, 3);
        assert_eq!(policy.retry.base_delay, Duration::from_millis(20));
        assert_eq!(policy.retry.backoff_factor, 2.0);
    }

    #[test]
    fn anti_entropy_window() {
        assert_eq!(SyncOptions::default().anti_entropy(), None);

        let options = SyncOptions::default().with_anti_entropy(Duration::from_secs(600));
        assert_eq!(options.anti_entropy(), Some(Duration::from_secs(600)));

        let options = options.with_cache_mode(CacheMode::AlwaysRefresh);
        assert_eq!(options.anti_entropy(), None);
    }

    #[test]
    fn sub_unit_durations_round_up() {
        let options = SyncOptions::default()
            .with_anti_entropy(Duration::from_millis(500))
            .with_retry_delay(Duration::from_micros(500))
            .with_call_timeout(Duration::from_micros(1500));
        assert_eq!(options.anti_entropy(), Some(Duration::from_secs(1)));
        assert_eq!(options.retry_delay_ms, 1);
        assert_eq!(options.call_timeout_ms, 2);

        let policy = options.resolve();
        assert_eq!(policy.retry.base_delay, Duration::from_millis(1));

        let exact = SyncOptions::default().with_anti_entropy(Duration::from_secs(60));
        assert_eq!(exact.anti_entropy_secs, 60);
        assert_eq!(SyncOptions::default().with_anti_entropy(Duration::ZERO).anti_entropy(), None);
    }

    #[test]
    fn parses_yaml() {
        let options = SyncOptions::from_yaml_str(
            "url: https://kb.internal\nauth_token: secret\nchunk_size: 250\nanti_entropy_secs: 3600\ncache_mode: always_refresh\n",
        )
        .unwrap();
        assert_eq!(options.url, "https://kb.internal");
        assert_eq!(options.chunk_size, 250);
        assert_eq!(options.parallelization, 0);
        assert_eq!(options.cache_mode, CacheMode::AlwaysRefresh);
    }

    #[test]
    fn rejects_negative_backoff() {
        let err = SyncOptions::from_yaml_str("retry_backoff_factor: -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "url: http://localhost:8080\nparallelization: 4").unwrap();

        let options = SyncOptions::from_yaml_file(file.path()).unwrap();
        assert_eq!(options.parallelization, 4);
    }

    #[test]
    fn merge_prefers_explicit_values() {
        let file = SyncOptions::new("http://from-file").with_chunk_size(100);
        let flags = SyncOptions::new("http://from-flag");

        let merged = file.merge(&flags);
        assert_eq!(merged.url, "http://from-flag");
        assert_eq!(merged.chunk_size, 100);
    }
}
