// src/provider/retry.rs — Bounded retry with exponential backoff for capability calls
//
// Retries: rate limits, transient generator failures, executor infrastructure errors.
// Does NOT retry: permanent generator failures (bad request, auth).
// Backoff sleeps are cancellable; the call itself is never interrupted.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::infra::errors::{ExecutionInfraError, GenerationError};

const MAX_RETRIES: u32 = 4;
const INITIAL_DELAY_MS: u64 = 2_000;
const BACKOFF_FACTOR: f64 = 2.0;
const MAX_DELAY_MS: u64 = 30_000;
const JITTER_FRACTION: f64 = 0.2;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay: Duration::from_millis(INITIAL_DELAY_MS),
            backoff_factor: BACKOFF_FACTOR,
            max_delay: Duration::from_millis(MAX_DELAY_MS),
            jitter_fraction: JITTER_FRACTION,
        }
    }
}

impl RetryConfig {
    /// Executor provisioning is slower to recover; fewer, shorter retries.
    pub fn for_executor() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(1_000),
            ..Default::default()
        }
    }

    /// No retries at all. Handy in tests.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given retry attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        // If the server told us how long to wait, use that (with a small buffer).
        if let Some(hinted) = hint {
            return hinted + Duration::from_millis(100);
        }

        let base_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(attempt as i32);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);

        let jitter = deterministic_jitter(attempt, self.jitter_fraction);
        let final_ms = (capped_ms * jitter).max(0.0);

        Duration::from_millis(final_ms as u64)
    }
}

/// Errors that know whether another try could help.
pub trait Retriable: std::fmt::Display {
    fn is_retriable(&self) -> bool;

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retriable for GenerationError {
    fn is_retriable(&self) -> bool {
        GenerationError::is_retriable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms().map(Duration::from_millis)
    }
}

impl Retriable for ExecutionInfraError {
    fn is_retriable(&self) -> bool {
        true
    }
}

/// How a retried call ended when it did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryFailure<E> {
    /// The error is not worth retrying.
    Fatal(E),
    /// Every allowed try failed with a retriable error.
    Exhausted { last: E, tries: u32 },
    /// Cancellation arrived while waiting to retry.
    Cancelled { last: E },
}

impl<E> RetryFailure<E> {
    pub fn into_error(self) -> E {
        match self {
            RetryFailure::Fatal(e) => e,
            RetryFailure::Exhausted { last, .. } => last,
            RetryFailure::Cancelled { last } => last,
        }
    }
}

/// Run `op` until it succeeds, fails fatally, runs out of retries, or is
/// cancelled during a backoff sleep.
pub async fn retry_transient<T, E, F, Fut>(
    config: &RetryConfig,
    label: &str,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryFailure<E>>
where
    E: Retriable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_retriable() {
            return Err(RetryFailure::Fatal(err));
        }
        if attempt >= config.max_retries {
            tracing::warn!(
                call = label,
                tries = attempt + 1,
                "Retries exhausted: {}",
                err
            );
            return Err(RetryFailure::Exhausted {
                last: err,
                tries: attempt + 1,
            });
        }

        let delay = config.delay_for_attempt(attempt, err.retry_after());
        tracing::warn!(
            call = label,
            attempt = attempt + 1,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Retrying after error: {}",
            err
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                return Err(RetryFailure::Cancelled { last: err });
            }
        }
        attempt += 1;
    }
}

/// Deterministic jitter for a given attempt to keep retries reproducible in tests.
/// Returns a multiplier in [1 - fraction, 1 + fraction].
fn deterministic_jitter(attempt: u32, fraction: f64) -> f64 {
    let hash = (attempt.wrapping_mul(2654435761)) as f64 / u32::MAX as f64;
    1.0 + fraction * (2.0 * hash - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> GenerationError {
        GenerationError::Transient {
            provider: "test".into(),
            message: "HTTP 503".into(),
        }
    }

    #[test]
    fn test_delay_for_attempt_exponential() {
        let cfg = RetryConfig::default();
        let d0 = cfg.delay_for_attempt(0, None);
        let d1 = cfg.delay_for_attempt(1, None);
        let d2 = cfg.delay_for_attempt(2, None);

        // d0 ≈ 2000ms, d1 ≈ 4000ms, d2 ≈ 8000ms
        assert!(d0.as_millis() >= 1500 && d0.as_millis() <= 2500);
        assert!(d1.as_millis() >= 3000 && d1.as_millis() <= 5000);
        assert!(d2.as_millis() >= 6000 && d2.as_millis() <= 10000);
    }

    #[test]
    fn test_delay_capped_at_max() {
        let cfg = RetryConfig::default();
        let d = cfg.delay_for_attempt(10, None);
        assert!(d.as_millis() <= 36_000); // max + jitter margin
    }

    #[test]
    fn test_delay_uses_hint() {
        let cfg = RetryConfig::default();
        let d = cfg.delay_for_attempt(0, Some(Duration::from_millis(10_000)));
        assert_eq!(d.as_millis(), 10_100);
    }

    #[test]
    fn test_deterministic_jitter_range() {
        for attempt in 0..20 {
            let j = deterministic_jitter(attempt, 0.2);
            assert!(
                (0.8..=1.2).contains(&j),
                "jitter {} out of range for attempt {}",
                j,
                attempt
            );
        }
    }

    #[test]
    fn test_executor_config_is_tighter() {
        let cfg = RetryConfig::for_executor();
        assert_eq!(cfg.max_retries, 2);
        assert_eq!(cfg.initial_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_infra_error_always_retriable() {
        let e = ExecutionInfraError::new("local", "boom");
        assert!(Retriable::is_retriable(&e));
        assert!(e.retry_after().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<u32, RetryFailure<GenerationError>> =
            retry_transient(&RetryConfig::default(), "test", &cancel, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(transient())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_permanent() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<(), _> =
            retry_transient(&RetryConfig::default(), "test", &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(GenerationError::Permanent {
                        provider: "test".into(),
                        message: "bad request".into(),
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(RetryFailure::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let cfg = RetryConfig {
            max_retries: 2,
            ..Default::default()
        };
        let result: Result<(), _> = retry_transient(&cfg, "test", &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        match result {
            Err(RetryFailure::Exhausted { tries, .. }) => assert_eq!(tries, 3),
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cancelled_during_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), _> =
            retry_transient(&RetryConfig::default(), "test", &cancel, || async {
                Err(transient())
            })
            .await;
        assert!(matches!(result, Err(RetryFailure::Cancelled { .. })));
    }

    #[test]
    fn test_into_error() {
        let f: RetryFailure<GenerationError> = RetryFailure::Exhausted {
            last: transient(),
            tries: 3,
        };
        assert_eq!(f.into_error(), transient());
    }
}
