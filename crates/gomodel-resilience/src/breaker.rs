use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Per-provider circuit breaker. Transitions are serialized under one mutex;
/// holds are counter updates only.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a panic elsewhere; the counters are
        // still coherent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Admission check before an upstream call.
    ///
    /// Closed admits everything. Open short-circuits until `open_timeout` has
    /// elapsed, then admits exactly one probe, moving to HalfOpen. While a
    /// probe is in flight every other caller observes Open.
    pub fn try_acquire(&self) -> Result<(), ()> {
        let mut inner = self.lock_inner();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.open_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    inner.consecutive_successes = 0;
                    Ok(())
                } else {
                    Err(())
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(())
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.lock_inner();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Records a retryable failure. Non-retryable errors (plain 4xx) must go
    /// through `on_neutral` instead; they do not move the breaker.
    pub fn on_failure(&self) {
        let mut inner = self.lock_inner();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.consecutive_successes = 0;
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                inner.consecutive_successes = 0;
            }
            BreakerState::Open => {}
        }
    }

    /// Releases an admission without counting toward either threshold.
    pub fn on_neutral(&self) {
        let mut inner = self.lock_inner();
        if inner.state == BreakerState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock_inner().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failures: u32, successes: u32, timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: failures,
            success_threshold: successes,
            open_timeout: Duration::from_millis(timeout_ms),
        })
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let cb = breaker(3, 1, 1000);
        for _ in 0..2 {
            cb.try_acquire().unwrap();
            cb.on_failure();
        }
        assert_eq!(cb.state(), BreakerState::Closed);
        cb.try_acquire().unwrap();
        cb.on_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn success_resets_failure_streak() {
        let cb = breaker(3, 1, 1000);
        cb.on_failure();
        cb.on_failure();
        cb.on_success();
        cb.on_failure();
        cb.on_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn recovers_through_half_open() {
        let cb = breaker(1, 2, 0);
        cb.on_failure();
        assert_eq!(cb.state(), BreakerState::Open);

        // Timeout of zero: the next acquire is the probe.
        cb.try_acquire().unwrap();
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.on_success();
        cb.try_acquire().unwrap();
        cb.on_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_admits_exactly_one_probe() {
        let cb = breaker(1, 1, 0);
        cb.on_failure();
        cb.try_acquire().unwrap();
        assert!(cb.try_acquire().is_err());
        assert!(cb.try_acquire().is_err());
        cb.on_neutral();
        cb.try_acquire().unwrap();
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = breaker(1, 1, 0);
        cb.on_failure();
        cb.try_acquire().unwrap();
        cb.on_failure();
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn open_times_out_into_half_open() {
        let cb = breaker(1, 1, 20);
        cb.on_failure();
        assert!(cb.try_acquire().is_err());
        std::thread::sleep(Duration::from_millis(30));
        cb.try_acquire().unwrap();
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }
}
