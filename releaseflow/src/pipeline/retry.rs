//! Per-stage retry policies with configurable backoff.
//!
//! Retry is never automatic: the default policy makes a single attempt
//! and fails fast. Retries are an explicit per-stage opt-in, and only
//! failures the executor marks retryable are retried.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backoff {
    /// delay = base
    Constant,
    /// delay = base * attempt
    Linear,
    /// delay = base * 2^(attempt - 1)
    #[default]
    Exponential,
}

/// Retry configuration applied per action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. 1 means fail fast.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff: Backoff,
    /// Whether to apply full jitter to delays.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff: Backoff::Exponential,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// The fail-fast policy: one attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a policy with the given total attempts.
    #[must_use]
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Disables jitter (useful for deterministic tests).
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Returns true if another attempt is allowed after `attempt`
    /// attempts have completed.
    #[must_use]
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Computes the delay before the attempt following attempt number
    /// `attempt` (1-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = self.base_delay_ms;

        let delay = match self.backoff {
            Backoff::Constant => base,
            Backoff::Linear => base.saturating_mul(u64::from(attempt)),
            Backoff::Exponential => {
                base.saturating_mul(2u64.saturating_pow(attempt - 1))
            }
        };
        let delay = delay.min(self.max_delay_ms);

        let jittered = if self.jitter && delay > 0 {
            rand::thread_rng().gen_range(0..=delay)
        } else {
            delay
        };

        Duration::from_millis(jittered)
    }
}
