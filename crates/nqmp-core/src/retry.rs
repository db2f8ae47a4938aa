//! Retry policy for transient answering-service failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries (0 = no retries, call once).
    pub max_retries: u32,
    /// Delay before the first retry (milliseconds).
    pub base_delay_ms: u64,
    /// Multiplier applied per further retry.
    pub factor: u32,
    /// Upper bound on a single delay (milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay_ms: 800,
            factor: 2,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total calls allowed per item.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (1-based):
    /// `min(max_delay, base_delay * factor^(retry - 1))`.
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let growth = u64::from(self.factor).saturating_pow(exponent);
        let millis = self
            .base_delay_ms
            .saturating_mul(growth)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}
