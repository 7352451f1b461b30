use cadence_core::ResourceKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for per-key failure backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub base: Duration,
    /// Upper bound for any delay
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
        }
    }
}

/// Exponential backoff keyed by object identity.
///
/// The n-th consecutive failure of a key waits `base * 2^(n-1)`, capped at
/// `max`. A success resets the key.
#[derive(Debug, Default)]
pub struct Backoff {
    config: BackoffConfig,
    failures: Mutex<HashMap<ResourceKey, u32>>,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure of `key` and return how long to wait before retrying
    pub fn next_delay(&self, key: &ResourceKey) -> Duration {
        let mut failures = self.failures.lock();
        let count = failures.entry(key.clone()).or_insert(0);
        let exponent = *count;
        *count = count.saturating_add(1);

        // 2^31 * base overflows long before the cap matters
        if exponent >= 31 {
            return self.config.max;
        }
        self.config
            .base
            .checked_mul(1u32 << exponent)
            .map_or(self.config.max, |delay| delay.min(self.config.max))
    }

    /// Clear the failure history of `key`
    pub fn forget(&self, key: &ResourceKey) {
        self.failures.lock().remove(key);
    }

    /// Consecutive failures recorded for `key`
    pub fn failures(&self, key: &ResourceKey) -> u32 {
        self.failures.lock().get(key).copied().unwrap_or(0)
    }
}
