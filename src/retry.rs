//! Retry with fixed or exponential backoff, shared by every fallback tier.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential { base: Duration, max: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn exponential(attempts: u32, base_ms: u64, max_ms: u64) -> Self {
        Self {
            attempts,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(base_ms),
                max: Duration::from_millis(max_ms),
            },
        }
    }

    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Delay before attempt `attempt` (1-based). The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        match &self.backoff {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt - 2);
                base.saturating_mul(factor).min(*max)
            }
        }
    }
}

/// Runs `operation` until it succeeds or the policy's attempts are spent.
/// The operation receives the 1-based attempt number. Returns the last error.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            debug!(attempt, delay_ms = delay.as_millis() as u64, "{label}: backing off");
            tokio::time::sleep(delay).await;
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(attempt, attempts, error = %e, "{label}: attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("{label}: no attempts made")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn exponential_delays_double_and_cap() {
        let policy = RetryPolicy::exponential(5, 100, 350);
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(350));
    }

    #[test]
    fn fixed_delay_is_constant_after_first_attempt() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(40));
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(3), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);
        let out = with_retry(&policy, "t", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    anyhow::bail!("flaky");
                }
                Ok(attempt)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_all_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);
        let err = with_retry(&policy, "t", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), _>(anyhow::anyhow!("boom {attempt}")) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.to_string(), "boom 3");
    }
}
