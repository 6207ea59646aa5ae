#![forbid(unsafe_code)]

//! Retry policies with deterministic backoff.
//!
//! Delays use fixed formulas (no jitter) so tests can assert exact
//! sequences. Only idempotent requests are retried, and only for statuses in
//! [`RetryPolicy::retriable_statuses`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use wrt_net::{BackoffStrategy, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, BackoffStrategy::Exponential {
//!     base_ms: 100,
//!     max_ms: 5000,
//! });
//!
//! assert_eq!(policy.delay(0), Duration::from_millis(100));
//! assert_eq!(policy.delay(1), Duration::from_millis(200));
//! assert_eq!(policy.delay(2), Duration::from_millis(400));
//! assert!(policy.is_retriable(503));
//! assert!(!policy.is_retriable(404));
//! ```

use serde::{Deserialize, Serialize};
use web_time::Duration;

/// Statuses worth another attempt: timeouts, throttling, and transient
/// upstream failures.
pub const DEFAULT_RETRIABLE_STATUSES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed { delay_ms: u64 },
    /// `base_ms * 2^attempt`, capped at `max_ms`.
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base_ms: 250,
            max_ms: 4_000,
        }
    }
}

/// Attempts, backoff, and which statuses to retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt).
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    pub retriable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, BackoffStrategy::default())
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, backoff: BackoffStrategy) -> Self {
        Self {
            max_retries,
            backoff,
            retriable_statuses: DEFAULT_RETRIABLE_STATUSES.to_vec(),
        }
    }

    /// Execute once.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(0, BackoffStrategy::Fixed { delay_ms: 0 })
    }

    /// Delay before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match &self.backoff {
            BackoffStrategy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            BackoffStrategy::Exponential { base_ms, max_ms } => {
                let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
                let delay = base_ms.saturating_mul(multiplier);
                Duration::from_millis(delay.min(*max_ms))
            }
        }
    }

    /// Sum of all retry delays.
    #[must_use]
    pub fn total_max_delay(&self) -> Duration {
        (0..self.max_retries).map(|i| self.delay(i)).sum()
    }

    #[must_use]
    pub fn is_retriable(&self, status: u16) -> bool {
        self.retriable_statuses.contains(&status)
    }
}
