use crate::config::{secs_to_duration, RetryPolicy};
use crate::engine::FetchResult;
use crate::resilience::backoff::{compute_backoff, should_retry};
use crate::resilience::RateLimiter;
use std::future::Future;
use std::time::Duration;

/// Runs a fetch attempt under the rate limiter, retrying per policy
///
/// The limiter is awaited before every attempt, including retries. A result
/// is retried only while it is non-ok, marked retryable, and attempts remain;
/// at most `max-retries + 1` attempts are made. A `Retry-After` header (in
/// seconds) raises the next sleep, capped at `max-delay`.
///
/// # Arguments
///
/// * `limiter` - Rate limiter of the engine issuing the call
/// * `policy` - Retry policy of the source
/// * `attempt` - Produces one attempt; receives the 1-based attempt number
///
/// # Returns
///
/// The last result, with `attempts` set to the number of attempts made.
pub async fn fetch_with_retry<F, Fut>(
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    mut attempt: F,
) -> FetchResult
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = FetchResult>,
{
    let max_attempts = policy.max_retries.saturating_add(1);
    let mut number = 1;

    loop {
        limiter.wait().await;
        let mut result = attempt(number).await;
        result.attempts = number;

        if result.ok || !result.is_retryable() || number >= max_attempts {
            return result;
        }

        let mut delay = compute_backoff(number, policy);
        if let Some(retry_after) = retry_after(&result, policy) {
            delay = delay.max(retry_after);
        }

        tracing::debug!(
            url = %result.url,
            attempt = number,
            status = ?result.status_code,
            delay_ms = delay.as_millis() as u64,
            "Retrying fetch"
        );

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        number += 1;
    }
}

/// Reads `Retry-After` in seconds, capped at the policy's max delay
fn retry_after(result: &FetchResult, policy: &RetryPolicy) -> Option<Duration> {
    let seconds: f64 = result.header("retry-after")?.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(secs_to_duration(seconds.min(policy.max_delay)))
}

/// Decides retryability of a received status under a policy
pub fn status_is_retryable(status: u16, policy: &RetryPolicy) -> bool {
    should_retry(Some(status), &policy.retryable_status)
}
