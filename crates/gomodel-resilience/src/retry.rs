use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Jittered exponential backoff.
///
/// Attempt `k` (0-indexed) waits `min(max_backoff, initial * factor^k)`
/// scaled by a uniform multiplier in `[1 - jitter, 1 + jitter]` before
/// attempt `k + 1`. Total upstream attempts are bounded by
/// `max_retries + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_factor: f64,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0);
        let base = self.initial_backoff.as_secs_f64() * factor.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());
        let jitter = self.jitter_factor.clamp(0.0, 1.0);
        let scale = if jitter > 0.0 {
            rand::rng().random_range(1.0 - jitter..=1.0 + jitter)
        } else {
            1.0
        };
        Duration::from_secs_f64((capped * scale).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_within_jitter_bounds() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter_factor: 0.2,
        };
        for attempt in 0..5u32 {
            let expected = 0.1 * 2f64.powi(attempt as i32);
            let delay = policy.delay(attempt).as_secs_f64();
            assert!(delay >= expected * 0.8 - 1e-9, "attempt {attempt}: {delay}");
            assert!(delay <= expected * 1.2 + 1e-9, "attempt {attempt}: {delay}");
        }
    }

    #[test]
    fn delay_caps_at_max_backoff() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(4),
            backoff_factor: 3.0,
            jitter_factor: 0.0,
        };
        assert_eq!(policy.delay(8), Duration::from_secs(4));
    }

    #[test]
    fn factor_below_one_is_clamped() {
        let policy = RetryPolicy {
            backoff_factor: 0.5,
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(3), policy.initial_backoff);
    }
}
