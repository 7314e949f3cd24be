//! Per-engine rate limiting
//!
//! Combines two gates: a minimum delay (plus uniform jitter) between granted
//! calls, and an optional governor token bucket of capacity `burst` refilling
//! at `rps` tokens per second.

use crate::config::{secs_to_duration, RateLimitConfig};
use crate::EngineError;
use governor::{Quota, RateLimiter as GovernorLimiter};
use rand::Rng;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

type DirectLimiter = GovernorLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Rate limiter shared by every worker of one engine instance
///
/// `wait()` holds an internal lock for its whole duration, so concurrent
/// callers are granted one at a time and the timestamp/bucket updates of one
/// grant never interleave with another.
pub struct RateLimiter {
    bucket: Option<DirectLimiter>,
    min_delay: Duration,
    jitter: Duration,
    last_granted: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Builds a limiter from configuration
    ///
    /// # Returns
    ///
    /// * `Ok(RateLimiter)` - The configured limiter
    /// * `Err(EngineError::RateLimit)` - `rps` or `burst` cannot form a quota
    pub fn new(config: &RateLimitConfig) -> Result<Self, EngineError> {
        let bucket = match config.rps {
            Some(rps) => Some(build_bucket(rps, config.burst)?),
            None => None,
        };

        Ok(Self {
            bucket,
            min_delay: secs_to_duration(config.min_delay),
            jitter: secs_to_duration(config.jitter),
            last_granted: Mutex::new(None),
        })
    }

    /// A limiter that grants every call immediately
    pub fn unlimited() -> Self {
        Self {
            bucket: None,
            min_delay: Duration::ZERO,
            jitter: Duration::ZERO,
            last_granted: Mutex::new(None),
        }
    }

    /// Waits until the next call may proceed
    pub async fn wait(&self) {
        let mut last = self.last_granted.lock().await;

        if let Some(previous) = *last {
            let gap = self.min_delay + sample_jitter(self.jitter);
            let ready_at = previous + gap;
            if ready_at > Instant::now() {
                tracing::trace!(delay_ms = gap.as_millis() as u64, "Rate limiter delaying call");
                tokio::time::sleep_until(ready_at).await;
            }
        }

        if let Some(bucket) = &self.bucket {
            bucket.until_ready().await;
        }

        *last = Some(Instant::now());
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("token_bucket", &self.bucket.is_some())
            .field("min_delay", &self.min_delay)
            .field("jitter", &self.jitter)
            .finish()
    }
}

fn build_bucket(rps: f64, burst: u32) -> Result<DirectLimiter, EngineError> {
    if !(rps > 0.0) || !rps.is_finite() {
        return Err(EngineError::RateLimit(format!("rps must be > 0, got {}", rps)));
    }
    let burst = NonZeroU32::new(burst)
        .ok_or_else(|| EngineError::RateLimit("burst must be >= 1".to_string()))?;
    let period = Duration::try_from_secs_f64(1.0 / rps)
        .map_err(|_| EngineError::RateLimit(format!("rps {} is too low", rps)))?;
    let quota = Quota::with_period(period)
        .ok_or_else(|| EngineError::RateLimit(format!("rps {} is too high", rps)))?
        .allow_burst(burst);
    Ok(GovernorLimiter::direct(quota))
}

/// Uniform sample in [0, max]
fn sample_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let fraction: f64 = rand::rng().random_range(0.0..=1.0);
    max.mul_f64(fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unlimited_does_not_block() {
        let limiter = RateLimiter::unlimited();
        let start = std::time::Instant::now();
        for _ in 0..10 {
            limiter.wait().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_min_delay_spaces_calls() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            min_delay: 0.05,
            ..RateLimitConfig::default()
        })
        .unwrap();

        let start = std::time::Instant::now();
        for _ in 0..3 {
            limiter.wait().await;
        }
        // First call is immediate, the next two each wait at least 50ms
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_min_delay_under_concurrency() {
        let limiter = Arc::new(
            RateLimiter::new(&RateLimitConfig {
                min_delay: 0.03,
                ..RateLimitConfig::default()
            })
            .unwrap(),
        );

        let start = std::time::Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.wait().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_token_bucket_limits_rate() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            rps: Some(20.0),
            burst: 1,
            ..RateLimitConfig::default()
        })
        .unwrap();

        let start = std::time::Instant::now();
        for _ in 0..4 {
            limiter.wait().await;
        }
        // One token up front, then one every 50ms
        assert!(start.elapsed() >= Duration::from_millis(140));
    }

    #[tokio::test]
    async fn test_burst_grants_immediately() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            rps: Some(1.0),
            burst: 3,
            ..RateLimitConfig::default()
        })
        .unwrap();

        let start = std::time::Instant::now();
        for _ in 0..3 {
            limiter.wait().await;
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_quota_rejected() {
        let zero_rps = RateLimitConfig {
            rps: Some(0.0),
            ..RateLimitConfig::default()
        };
        assert!(RateLimiter::new(&zero_rps).is_err());

        let zero_burst = RateLimitConfig {
            rps: Some(1.0),
            burst: 0,
            ..RateLimitConfig::default()
        };
        assert!(RateLimiter::new(&zero_burst).is_err());

        let glacial = RateLimitConfig {
            rps: Some(1e-300),
            ..RateLimitConfig::default()
        };
        assert!(RateLimiter::new(&glacial).is_err());
    }

    #[test]
    fn test_huge_delays_clamped() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            min_delay: 1e30,
            jitter: f64::INFINITY,
            ..RateLimitConfig::default()
        })
        .unwrap();
        assert_eq!(limiter.min_delay, Duration::from_secs(86_400));
        assert_eq!(limiter.jitter, Duration::from_secs(86_400));
    }

    #[test]
    fn test_jitter_bounds() {
        let max = Duration::from_millis(40);
        for _ in 0..100 {
            assert!(sample_jitter(max) <= max);
        }
        assert_eq!(sample_jitter(Duration::ZERO), Duration::ZERO);
    }
}
