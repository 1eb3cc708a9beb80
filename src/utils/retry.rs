//! Backoff policy for retrying transient probe failures
//!
//! Delay before retry `n` (1-based) is `min(initial * multiplier^(n-1), max)`
//! plus up to 25% jitter.

use std::time::Duration;

use crate::config::defaults::DEFAULT_BACKOFF_JITTER_PERCENT;
use crate::config::ProbeConfig;
use crate::utils::jitter::generate_jitter_percent;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on the un-jittered delay
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn from_probe_config(config: &ProbeConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms.max(config.initial_backoff_ms)),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_ms = exponential_delay.min(self.max_delay.as_millis() as f64) as u64;

        let final_delay = if self.jitter {
            delay_ms + generate_jitter_percent(delay_ms, DEFAULT_BACKOFF_JITTER_PERCENT)
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_and_caps_without_jitter() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(350));
        assert_eq!(config.delay_for(4), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let config = RetryConfig {
            jitter: true,
            ..RetryConfig::default()
        };
        for _ in 0..50 {
            let delay = config.delay_for(1);
            assert!(delay >= Duration::from_millis(250));
            assert!(delay <= Duration::from_millis(312));
        }
    }

    #[test]
    fn test_from_probe_config() {
        let probe = ProbeConfig {
            max_attempts: 0,
            initial_backoff_ms: 500,
            max_backoff_ms: 100,
            ..ProbeConfig::default()
        };
        let config = RetryConfig::from_probe_config(&probe);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.max_delay, Duration::from_millis(500));
    }
}
