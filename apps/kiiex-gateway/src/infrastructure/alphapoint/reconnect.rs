//! Reconnection Policy
//!
//! The venue connection is retried after a fixed delay, indefinitely, until
//! it succeeds. There is no backoff and no attempt limit: the gateway is
//! useless without the venue, so it keeps trying at a steady pace.

use std::time::Duration;

/// Default delay between reconnection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before each attempt.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectConfig {
    /// Create a configuration with a custom delay.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

/// Fixed-delay reconnection policy.
///
/// # Example
///
/// ```rust
/// use kiiex_gateway::infrastructure::alphapoint::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_secs(5)));
/// assert_eq!(policy.next_delay(), Duration::from_secs(5));
/// assert_eq!(policy.next_delay(), Duration::from_secs(5));
/// assert_eq!(policy.attempt_count(), 2);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt. Always the configured delay.
    pub const fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.config.delay
    }

    /// Attempts made so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delay_is_five_seconds() {
        assert_eq!(ReconnectConfig::default().delay, Duration::from_secs(5));
    }

    #[test]
    fn delay_never_grows() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_millis(100)));

        for _ in 0..1000 {
            assert_eq!(policy.next_delay(), Duration::from_millis(100));
        }
        assert_eq!(policy.attempt_count(), 1000);
    }
}
