use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; exceeding this abandons the batch.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `retry` (1-based): base × 2^(retry-1),
    /// capped at `max_delay`, with ±20% jitter when enabled. Jitter is
    /// skipped once the uncapped delay reaches the cap, so successive delays
    /// never decrease and never exceed `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(1u64 << exponent);
        let delay = Duration::from_millis(millis).min(self.max_delay);

        if self.jitter && delay < self.max_delay {
            apply_jitter(delay).min(self.max_delay)
        } else {
            delay
        }
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let mut rng = rand::rng();
    let factor: f64 = rng.random_range(0.8..1.2);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}
