//! Bounded retry with exponential backoff for routing providers.

use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::RetryPolicy;
use crate::error::ProviderError;
use crate::model::{Coordinates, PathSegment};
use crate::traits::RoutingProvider;

/// Exponential backoff delay with up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Wraps a provider and retries retryable failures.
///
/// Non-retryable errors and the error of the last attempt are returned
/// unchanged.
#[derive(Debug, Clone)]
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: RoutingProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: RoutingProvider> RoutingProvider for RetryingProvider<P> {
    fn route(&self, start: Coordinates, end: Coordinates) -> Result<Vec<PathSegment>, ProviderError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.route(start, end) {
                Ok(segments) => return Ok(segments),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay =
                        calculate_backoff(attempt, self.policy.base_delay_ms, self.policy.max_delay_ms);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "routing provider call failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        error: fn() -> ProviderError,
    }

    impl RoutingProvider for Flaky {
        fn route(&self, start: Coordinates, end: Coordinates) -> Result<Vec<PathSegment>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err((self.error)());
            }
            Ok(vec![PathSegment {
                geometry: vec![start, end],
                cost: 1.0,
                time_cost: 60.0,
                cumulative_cost: 1.0,
                cumulative_time_cost: 60.0,
            }])
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    const A: Coordinates = Coordinates::new(0.0, 0.0);
    const B: Coordinates = Coordinates::new(0.0, 0.01);

    #[test]
    fn test_backoff_calculation() {
        assert_eq!(calculate_backoff(0, 100, 2000), Duration::ZERO);
        assert!(calculate_backoff(1, 100, 2000).as_millis() >= 100);
        assert!(calculate_backoff(2, 100, 2000).as_millis() >= 200);

        let capped = calculate_backoff(10, 100, 1000);
        assert!(capped.as_millis() >= 1000 && capped.as_millis() < 1100);
    }

    #[test]
    fn recovers_after_transient_failures() {
        let provider = RetryingProvider::new(
            Flaky {
                failures: 2,
                calls: AtomicU32::new(0),
                error: || ProviderError::Status(503),
            },
            policy(3),
        );

        assert!(provider.route(A, B).is_ok());
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausted_retries_surface_last_error() {
        let provider = RetryingProvider::new(
            Flaky {
                failures: 10,
                calls: AtomicU32::new(0),
                error: || ProviderError::Status(502),
            },
            policy(3),
        );

        let err = provider.route(A, B).unwrap_err();
        assert!(matches!(err, ProviderError::Status(502)));
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let provider = RetryingProvider::new(
            Flaky {
                failures: 10,
                calls: AtomicU32::new(0),
                error: || ProviderError::Malformed("bad".into()),
            },
            policy(5),
        );

        assert!(provider.route(A, B).is_err());
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 1);
    }
}
