//! Retry + circuit-breaker wrapper around outbound provider calls, plus the
//! process-wide HTTP client they share.

pub mod breaker;
pub mod client;
pub mod retry;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tracing::warn;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use client::{
    ByteStream, CallFailure, HttpClientConfig, HttpMethod, HttpRequest, HttpResponse,
    HttpResponseBody, SharedHttpClient, TransportErrorKind,
};
pub use retry::RetryPolicy;

#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
}

struct ProviderResilience {
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

/// Executes idempotent upstream operations with per-provider retry and
/// circuit-breaker policies. Providers register their merged settings at
/// startup; after that the engine is read-only apart from breaker state.
#[derive(Default)]
pub struct ResilienceEngine {
    providers: Mutex<HashMap<String, Arc<ProviderResilience>>>,
}

impl ResilienceEngine {
    fn lock_providers(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, Arc<ProviderResilience>>> {
        self.providers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: &str, config: ResilienceConfig) {
        let mut guard = self.lock_providers();
        guard.insert(
            provider.to_string(),
            Arc::new(ProviderResilience {
                retry: config.retry,
                breaker: CircuitBreaker::new(config.breaker),
            }),
        );
    }

    pub fn breaker_state(&self, provider: &str) -> Option<BreakerState> {
        let guard = self.lock_providers();
        guard.get(provider).map(|p| p.breaker.state())
    }

    fn provider(&self, provider: &str) -> Arc<ProviderResilience> {
        let mut guard = self.lock_providers();
        guard
            .entry(provider.to_string())
            .or_insert_with(|| {
                Arc::new(ProviderResilience {
                    retry: RetryPolicy::default(),
                    breaker: CircuitBreaker::new(BreakerConfig::default()),
                })
            })
            .clone()
    }

    /// Runs `op` with retries. `op` receives the 0-indexed attempt number.
    ///
    /// Retries apply only to transient failures (`CallFailure::is_retryable`);
    /// a plain 4xx returns immediately without moving the breaker. When the
    /// breaker opens mid-sequence the last observed error is returned; a
    /// caller that finds the circuit already open gets `CircuitOpen` without
    /// any upstream attempt.
    pub async fn execute<T, F, Fut>(&self, provider: &str, op: F) -> Result<T, CallFailure>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T, CallFailure>>,
    {
        let runtime = self.provider(provider);
        let mut last_failure: Option<CallFailure> = None;

        for attempt in 0..=runtime.retry.max_retries {
            if runtime.breaker.try_acquire().is_err() {
                return Err(last_failure.unwrap_or(CallFailure::CircuitOpen {
                    provider: provider.to_string(),
                }));
            }

            match op(attempt).await {
                Ok(value) => {
                    runtime.breaker.on_success();
                    return Ok(value);
                }
                Err(failure) if failure.is_retryable() => {
                    runtime.breaker.on_failure();
                    warn!(provider, attempt, error = %failure, "upstream attempt failed");
                    if attempt == runtime.retry.max_retries {
                        return Err(failure);
                    }
                    last_failure = Some(failure);
                    tokio::time::sleep(runtime.retry.delay(attempt)).await;
                }
                Err(failure) => {
                    runtime.breaker.on_neutral();
                    return Err(failure);
                }
            }
        }

        // Unreachable: the loop always returns on its final attempt.
        Err(last_failure.unwrap_or(CallFailure::CircuitOpen {
            provider: provider.to_string(),
        }))
    }
}
