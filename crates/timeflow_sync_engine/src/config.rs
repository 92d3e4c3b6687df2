//! Engine tunables that are not user settings.

use std::path::PathBuf;
use std::time::Duration;

/// Default period of the short server poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Default quiet period after a local change before syncing.
pub const DEFAULT_LOCAL_CHANGE_DEBOUNCE: Duration = Duration::from_millis(1_500);

/// Lower bound of the acknowledgement timeout.
pub const MIN_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound of the acknowledgement timeout.
pub const MAX_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a [`crate::SyncEngine`] and its scheduler.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of the fixed poll that catches changes made by other devices.
    pub poll_interval: Duration,
    /// Quiet period after a local change before a sync is attempted.
    pub local_change_debounce: Duration,
    /// Retry policy for acknowledgements.
    pub ack_retry: RetryConfig,
    /// File the per-run sync log is appended to, if any.
    pub sync_log_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Creates a configuration with default timings and no sync log.
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            local_change_debounce: DEFAULT_LOCAL_CHANGE_DEBOUNCE,
            ack_retry: RetryConfig::default(),
            sync_log_path: None,
        }
    }

    /// Sets the poll period.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the local-change debounce.
    pub fn with_local_change_debounce(mut self, debounce: Duration) -> Self {
        self.local_change_debounce = debounce;
        self
    }

    /// Sets the acknowledgement retry policy.
    pub fn with_ack_retry(mut self, retry: RetryConfig) -> Self {
        self.ack_retry = retry;
        self
    }

    /// Enables the sync log at `path`.
    pub fn with_sync_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.sync_log_path = Some(path.into());
        self
    }

    /// Timeout for acknowledgements derived from the user's request timeout.
    pub fn ack_timeout(request_timeout: Duration) -> Duration {
        request_timeout.clamp(MIN_ACK_TIMEOUT, MAX_ACK_TIMEOUT)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_builder() {
        let config = EngineConfig::new()
            .with_poll_interval(Duration::from_secs(5))
            .with_local_change_debounce(Duration::from_millis(200))
            .with_sync_log("/tmp/sync.log");

        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.local_change_debounce, Duration::from_millis(200));
        assert_eq!(config.sync_log_path, Some(PathBuf::from("/tmp/sync.log")));
        assert_eq!(config.ack_retry.max_attempts, 3);
    }

    #[test]
    fn ack_timeout_is_clamped() {
        assert_eq!(EngineConfig::ack_timeout(Duration::from_secs(3)), MIN_ACK_TIMEOUT);
        assert_eq!(
            EngineConfig::ack_timeout(Duration::from_secs(7)),
            Duration::from_secs(7)
        );
        assert_eq!(EngineConfig::ack_timeout(Duration::from_secs(60)), MAX_ACK_TIMEOUT);
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(250));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(500));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }
}
