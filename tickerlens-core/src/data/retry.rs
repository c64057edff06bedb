//! Bounded retry policy shared by every upstream call.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `retry_delay * attempt`: 1x after the first failure, 2x after the second.
    #[default]
    Linear,
    /// `retry_delay` after every failure.
    Fixed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always >= 1.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Minimum spacing between any two upstream requests.
    pub pacing: Duration,
    pub backoff: Backoff,
    /// Time budget for one attempt, measured from its first request and
    /// shared by every request the attempt makes.
    pub attempt_timeout: Duration,
}

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration, pacing: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            pacing,
            backoff: Backoff::Linear,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// No pacing and no backoff; useful when the provider is local.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Wait after failed attempt number `attempt` (1-based) before the next one.
    pub fn delay_before_retry(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear => self.retry_delay.saturating_mul(attempt),
            Backoff::Fixed => self.retry_delay,
        }
    }
}

impl Default for RetryPolicy {
    /// Three attempts, 2s linear backoff, 1s pacing, 10s per attempt.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(1))
    }
}
