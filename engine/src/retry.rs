//! Bounded retries with a fixed backoff ladder.
//!
//! Only transient error kinds (rate-limit, timeout, session) are retried;
//! everything else surfaces immediately. Sleeping goes through
//! `tokio::time::sleep`, so backoff never blocks other in-flight operations.
//! The usage counter for an operation type increments exactly once, on
//! eventual success.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use quill_types::{EngineError, OperationKind};

use crate::usage::UsageTracker;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_LADDER: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries (not counting the initial attempt).
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff[min(n, len-1)]`.
    pub backoff: Vec<Duration>,
    /// Down-jitter factor in `[0, 1)`: the delay is multiplied by a random
    /// value in `[1 - jitter_factor, 1]`. Zero keeps the ladder exact.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF_LADDER.to_vec(),
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let Some(last) = self.backoff.last() else {
            return Duration::ZERO;
        };
        let index = (attempt as usize).min(self.backoff.len() - 1);
        let base = *self.backoff.get(index).unwrap_or(last);
        if self.jitter_factor > 0.0 {
            let jitter = 1.0 - rand::random::<f64>() * self.jitter_factor;
            base.mul_f64(jitter)
        } else {
            base
        }
    }
}

/// Executes single operation attempts under the retry policy, crediting the
/// usage tracker on eventual success.
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    usage: Arc<UsageTracker>,
}

impl RetryController {
    #[must_use]
    pub fn new(policy: RetryPolicy, usage: Arc<UsageTracker>) -> Self {
        Self { policy, usage }
    }

    /// Run `attempt` until it succeeds or retries are exhausted, then record
    /// one usage increment for `kind` on success.
    ///
    /// A non-transient error is returned as-is after a single attempt. A
    /// transient error that survives all retries is replaced by the stable
    /// user-facing message for its kind.
    pub async fn execute<T, F, Fut>(
        &self,
        kind: OperationKind,
        attempt: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let value = self.execute_unrecorded(kind, attempt).await?;
        self.usage.record_success(kind);
        Ok(value)
    }

    /// Same retry loop without the usage credit. Used by the streaming path,
    /// which records usage only once the whole generation completes.
    pub(crate) async fn execute_unrecorded<T, F, Fut>(
        &self,
        kind: OperationKind,
        mut attempt: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut retries = 0u32;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(error) if !error.kind.is_transient() => return Err(error),
                Err(error) if retries >= self.policy.max_retries => {
                    tracing::warn!(
                        operation = %kind,
                        kind = ?error.kind,
                        error = %error,
                        attempts = retries + 1,
                        "retries exhausted"
                    );
                    return Err(error.user_facing());
                }
                Err(error) => {
                    let delay = self.policy.delay(retries);
                    tracing::debug!(
                        operation = %kind,
                        kind = ?error.kind,
                        error = %error,
                        retry = retries + 1,
                        delay_ms = delay.as_millis(),
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RetryController, RetryPolicy};
    use crate::usage::UsageTracker;
    use quill_types::{EngineError, ErrorKind, OperationKind};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn controller(usage: &Arc<UsageTracker>) -> RetryController {
        RetryController::new(RetryPolicy::default(), Arc::clone(usage))
    }

    #[tokio::test(start_paused = true)]
    async fn fail_twice_then_succeed_records_one_usage_increment() {
        let usage = Arc::new(UsageTracker::default());
        let retry = controller(&usage);
        let attempts = AtomicU32::new(0);

        let result = retry
            .execute(OperationKind::Summarize, || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(EngineError::new(ErrorKind::Timeout, "timed out"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(usage.count(OperationKind::Summarize), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_rate_limit_exhausts_max_retries_plus_one_attempts() {
        let usage = Arc::new(UsageTracker::default());
        let retry = controller(&usage);
        let attempts = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = retry
            .execute(OperationKind::Write, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(EngineError::new(ErrorKind::RateLimit, "429")) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimit);
        assert_eq!(err.message, ErrorKind::RateLimit.user_message());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(usage.total(), 0);
        // Full ladder slept: 2s + 4s + 8s.
        assert!(started.elapsed() >= Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn validation_error_is_attempted_exactly_once() {
        let usage = Arc::new(UsageTracker::default());
        let retry = controller(&usage);
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = retry
            .execute(OperationKind::Proofread, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(EngineError::validation("bad input")) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.message, "bad input");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_error_is_not_retried() {
        let usage = Arc::new(UsageTracker::default());
        let retry = controller(&usage);
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = retry
            .execute(OperationKind::Translate, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(EngineError::unavailable("translator missing")) }
            })
            .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::Unavailable);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ladder_clamps_to_final_rung() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(2));
        assert_eq!(policy.delay(1), Duration::from_secs(4));
        assert_eq!(policy.delay(2), Duration::from_secs(8));
        assert_eq!(policy.delay(9), Duration::from_secs(8));
    }

    #[test]
    fn jitter_only_reduces_delay() {
        let policy = RetryPolicy {
            jitter_factor: 0.25,
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            let delay = policy.delay(0);
            assert!(delay >= Duration::from_millis(1500));
            assert!(delay <= Duration::from_secs(2));
        }
    }
}
