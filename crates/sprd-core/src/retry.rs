//! Bounded retry for soft transport read failures.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often a failed or empty bulk read is retried before giving up.
///
/// `Disconnected` and other hard failures are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Additional attempts after the first read.
    pub max_retries: u32,
    /// Pause between attempts.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 50,
        }
    }
}

impl RetryPolicy {
    /// Fail on the first error.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 0,
        }
    }

    pub const fn new(max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_ms,
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Total read attempts allowed.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
