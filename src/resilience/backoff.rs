use crate::config::{secs_to_duration, BackoffMode, RetryPolicy};
use rand::Rng;
use std::time::Duration;

/// Computes the delay before retry number `attempt` (1-based)
///
/// Uses the thread-local RNG for jitter; see [`compute_backoff_with`] for a
/// deterministic variant.
pub fn compute_backoff(attempt: u32, policy: &RetryPolicy) -> Duration {
    compute_backoff_with(attempt, policy, &mut rand::rng())
}

/// Computes the backoff delay drawing jitter from the given RNG
///
/// The base delay (`none` = 0, `fixed` = base, `exp` = base * 2^(attempt-1))
/// is capped at `max-delay`, then scaled by a uniform factor in
/// `[1 - jitter, 1 + jitter]`. The result always lies in `[0, max-delay]`.
///
/// # Arguments
///
/// * `attempt` - Retry number, starting at 1 (0 is treated as 1)
/// * `policy` - Retry policy supplying mode, delays and jitter
/// * `rng` - Random source for the jitter factor
pub fn compute_backoff_with<R: Rng + ?Sized>(
    attempt: u32,
    policy: &RetryPolicy,
    rng: &mut R,
) -> Duration {
    let base = base_backoff(attempt, policy);
    if base <= 0.0 {
        return Duration::ZERO;
    }

    let jitter = policy.jitter_fraction.clamp(0.0, 1.0);
    let factor = if jitter > 0.0 {
        1.0 + rng.random_range(-jitter..=jitter)
    } else {
        1.0
    };

    secs_to_duration((base * factor).min(policy.max_delay))
}

/// Base delay in seconds before jitter, already capped at `max-delay`
pub fn base_backoff(attempt: u32, policy: &RetryPolicy) -> f64 {
    let attempt = attempt.max(1);
    let base = policy.base_delay.max(0.0);
    let raw = match policy.backoff {
        BackoffMode::None => 0.0,
        BackoffMode::Fixed => base,
        // Exponent is bounded so the multiplication cannot overflow to inf
        BackoffMode::Exp => base * 2f64.powi((attempt - 1).min(62) as i32),
    };
    raw.min(policy.max_delay.max(0.0))
}

/// Returns true if a fetch outcome should be retried
///
/// A missing status code means a transport failure, which is always
/// retryable; otherwise the status must be in the retryable set.
pub fn should_retry(status_code: Option<u16>, retryable: &[u16]) -> bool {
    match status_code {
        None => true,
        Some(code) => retryable.contains(&code),
    }
}
