//! Bounded retry with exponential backoff and a per-attempt timeout.
//!
//! Nothing in the runtime waits on persistence or signing without a bound:
//! each attempt is cut off after [`RetryPolicy::timeout`], and the whole
//! operation gives up after [`RetryPolicy::max_attempts`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(50);
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Single attempt, no backoff.
    pub fn once(timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            timeout,
        }
    }

    /// Delay before attempt `attempt + 1` (attempt is 1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            base_delay: Self::DEFAULT_BASE_DELAY,
            max_delay: Self::DEFAULT_MAX_DELAY,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

/// Why a single attempt failed.
#[derive(Debug)]
pub enum AttemptError<E> {
    Failed(E),
    TimedOut(Duration),
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Failed(e) => write!(f, "{e}"),
            AttemptError::TimedOut(after) => write!(f, "timed out after {after:?}"),
        }
    }
}

/// All attempts failed.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed after {attempts} attempts: {last}")]
pub struct RetryExhausted<E: fmt::Display + fmt::Debug> {
    pub operation: &'static str,
    pub attempts: u32,
    pub last: AttemptError<E>,
}

/// Run `op` until it succeeds or the policy is exhausted.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + fmt::Debug,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => AttemptError::Failed(e),
            Err(_) => AttemptError::TimedOut(policy.timeout),
        };

        if attempt >= max_attempts {
            return Err(RetryExhausted {
                operation,
                attempts: attempt,
                last: error,
            });
        }

        let delay = policy.backoff(attempt);
        tracing::warn!(
            target: "runtime::retry",
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
