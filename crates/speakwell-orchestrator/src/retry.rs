//! Bounded retry with exponential backoff for external calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{LlmErrorKind, PracticeError, Result};

/// Delay before the second attempt. Doubles for each further attempt.
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Retry policy applied to every completion call.
///
/// Each attempt runs under a hard deadline; an attempt that overruns it fails
/// with a retryable `Timeout` error. Retryable errors (rate limits and
/// timeouts) are retried after `base_delay * 2^attempt`. Any other error ends
/// the run immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Creates a policy making at most `max_retries` attempts (minimum one).
    #[must_use]
    pub fn new(max_retries: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay: BASE_DELAY,
            attempt_timeout,
        }
    }

    /// Builds a policy from the `retry` config section.
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_secs(config.call_timeout_secs),
        )
    }

    /// Overrides the initial backoff delay.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Maximum number of attempts.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Deadline applied to each attempt.
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Backoff delay after the given zero-based attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or
    /// attempts are exhausted.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `call`.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.attempt_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(PracticeError::llm_api_error(
                    LlmErrorKind::Timeout,
                    format!(
                        "{operation} did not complete within {}s",
                        self.attempt_timeout.as_secs()
                    ),
                )),
            };

            match result {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "Retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Like [`run`](Self::run), but logs the failure and returns `default`
    /// instead of an error.
    pub async fn run_or_default<T, F, Fut>(&self, operation: &str, default: T, call: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.run(operation, call).await {
            Ok(value) => value,
            Err(e) => {
                warn!(operation, error = %e, "Call failed, using default");
                default
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use tokio::time::Instant;

    use super::*;

    fn rate_limited() -> PracticeError {
        PracticeError::llm_api_error(LlmErrorKind::RateLimit, "429 Too Many Requests")
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(15))
    }

    #[test]
    fn test_delay_doubles() {
        let policy = policy();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn test_from_config() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_retries: 0,
            call_timeout_secs: 7,
        });
        assert_eq!(policy.max_retries(), 1);
        assert_eq!(policy.attempt_timeout(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_twice_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = policy()
            .run("question", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(rate_limited())
                    } else {
                        Ok("What do you enjoy about travelling?")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "What do you enjoy about travelling?");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Backoff of 1s then 2s.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_rate_limited_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));

        let err = policy()
            .run("scoring", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(rate_limited())
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = policy()
            .run("scoring", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(PracticeError::llm_api_error(
                        LlmErrorKind::Authentication,
                        "401",
                    ))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_or_default_never_propagates() {
        let value = policy()
            .run_or_default("scoring", 5.0, || async {
                Err::<f64, _>(PracticeError::llm_api_error(LlmErrorKind::Server, "500"))
            })
            .await;
        assert!((value - 5.0).abs() < f64::EPSILON);

        let value = policy()
            .run_or_default("scoring", 5.0, || async { Err::<f64, _>(rate_limited()) })
            .await;
        assert!((value - 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out_and_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(2, Duration::from_secs(15));
        let start = Instant::now();

        let result = policy
            .run("question", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // 15s deadline plus 1s backoff.
        assert_eq!(start.elapsed(), Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_error_names_operation() {
        let err = RetryPolicy::new(1, Duration::from_secs(5))
            .run("transcription", || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PracticeError::LlmApiError {
                kind: LlmErrorKind::Timeout,
                ..
            }
        ));
        assert!(err.to_string().contains("transcription did not complete within 5s"));
    }
}
