//! Resilience primitives shared by every fetch engine
//!
//! - [`RateLimiter`]: min-delay/jitter gate plus optional token bucket
//! - [`compute_backoff`]: retry delay per policy
//! - [`should_retry`]: retry predicate over status codes
//! - [`fetch_with_retry`]: the retry loop engines wrap their attempts in

mod backoff;
mod rate_limiter;
mod retry;

pub use backoff::{base_backoff, compute_backoff, compute_backoff_with, should_retry};
pub use rate_limiter::RateLimiter;
pub use retry::{fetch_with_retry, status_is_retryable};
