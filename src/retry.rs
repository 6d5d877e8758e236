//! Retry policies for the two flavors of flaky operation in this pipeline:
//! page fetches (linear backoff, failures are usually short rendering stalls)
//! and storage uploads (exponential backoff against a rate-limited API).

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// How the inter-attempt delay grows.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// `base * attempt` after the n-th failed attempt.
    Linear { base: Duration },
    /// `base * 2^(attempt-1)`, capped.
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    /// Delay to sleep after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Linear { base } => base.checked_mul(attempt).unwrap_or(base),
            Backoff::Exponential { base, cap } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.checked_mul(factor).unwrap_or(cap).min(cap)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, base: Duration) -> Self {
        Self { max_attempts, backoff: Backoff::Linear { base } }
    }

    pub fn exponential(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self { max_attempts, backoff: Backoff::Exponential { base, cap } }
    }
}

/// Run a fallible async operation under a retry policy.
///
/// `retryable` decides whether a given error is worth another attempt;
/// a fatal error is returned immediately without sleeping.
pub async fn with_retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let mut last_error: Option<E> = None;
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !retryable(&e) {
                    warn!(operation, attempt, error = %e, "fatal error, not retrying");
                    return Err(e);
                }
                if attempt < max_attempts {
                    let delay = policy.backoff.delay(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, backing off"
                    );
                    sleep(delay).await;
                } else {
                    warn!(operation, attempt, error = %e, "all attempts failed");
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.expect("should have last error after all retries"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn linear_delay_grows_with_attempt_number() {
        let backoff = Backoff::Linear { base: Duration::from_secs(5) };
        assert_eq!(backoff.delay(1), Duration::from_secs(5));
        assert_eq!(backoff.delay(2), Duration::from_secs(10));
        assert_eq!(backoff.delay(3), Duration::from_secs(15));
    }

    #[test]
    fn exponential_delay_doubles_and_is_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(6),
        };
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(4));
        assert_eq!(backoff.delay(4), Duration::from_secs(6));
        assert_eq!(backoff.delay(10), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn returns_first_success_without_extra_attempts() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);

        let result: Result<u32, String> = with_retry(&policy, "op", |_| true, || {
            calls_in.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(1), Duration::from_millis(4));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);

        let result: Result<u32, String> = with_retry(&policy, "op", |_| true, || {
            let n = calls_in.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("connection reset".to_string())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_exactly_max_attempts() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);

        let result: Result<u32, String> = with_retry(&policy, "op", |_| true, || {
            calls_in.fetch_add(1, Ordering::SeqCst);
            async { Err("timeout".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_stop_the_loop_immediately() {
        let policy = RetryPolicy::linear(5, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);

        let result: Result<u32, String> =
            with_retry(&policy, "op", |e: &String| e.contains("timeout"), || {
                calls_in.fetch_add(1, Ordering::SeqCst);
                async { Err("access denied".to_string()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
