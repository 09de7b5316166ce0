//! Token bucket gating network prologue fetches.
//!
//! Local reads never touch the limiter. A `429 Too Many Requests` answer
//! drains the bucket and backs off exponentially; the orchestrator itself
//! never retries.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::debug;

/// Backoff multiplier cap (2^6 = 64x).
const MAX_BACKOFF_SHIFT: u32 = 6;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
    backoff_until: Option<Instant>,
    backoff_shift: u32,
}

/// Shared fetch rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    /// Tokens per second; `0` disables limiting.
    rate: f64,
    burst: u32,
}

impl RateLimiter {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket {
                tokens: f64::from(burst),
                last_update: Instant::now(),
                backoff_until: None,
                backoff_shift: 0,
            }),
            rate,
            burst,
        }
    }

    /// Limiter that admits everything.
    pub fn unlimited() -> Self {
        Self::new(0.0, 0)
    }

    pub fn is_unlimited(&self) -> bool {
        self.rate <= 0.0
    }

    /// Take a token if one is available.
    pub fn try_acquire(&self) -> bool {
        if self.is_unlimited() {
            return true;
        }
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        if bucket.backoff_until.is_some_and(|until| now < until) {
            return false;
        }
        bucket.backoff_until = None;
        self.replenish(&mut bucket, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until the next token becomes available.
    pub fn wait_duration(&self) -> Duration {
        if self.is_unlimited() {
            return Duration::ZERO;
        }
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        if let Some(until) = bucket.backoff_until
            && now < until
        {
            return until - now;
        }
        self.replenish(&mut bucket, now);

        if bucket.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate)
        }
    }

    /// Block the calling worker until a token is taken.
    pub fn acquire(&self) {
        while !self.try_acquire() {
            std::thread::sleep(self.wait_duration().max(Duration::from_millis(1)));
        }
    }

    /// Record a rate-limit answer from the remote host.
    pub fn record_rate_limit(&self, retry_after: Option<u64>) {
        if self.is_unlimited() {
            return;
        }
        let mut bucket = self.bucket.lock();
        bucket.backoff_shift = (bucket.backoff_shift + 1).min(MAX_BACKOFF_SHIFT);
        let secs = retry_after.unwrap_or(1) << bucket.backoff_shift;
        bucket.backoff_until = Some(Instant::now() + Duration::from_secs(secs));
        bucket.tokens = 0.0;
        debug!("classify"; "rate limited, backing off for {}s", secs);
    }

    /// Relax backoff after a successful fetch.
    pub fn record_success(&self) {
        let mut bucket = self.bucket.lock();
        bucket.backoff_shift = bucket.backoff_shift.saturating_sub(1);
    }

    fn replenish(&self, bucket: &mut TokenBucket, now: Instant) {
        let elapsed = now.duration_since(bucket.last_update).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(f64::from(self.burst));
        bucket.last_update = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_empty() {
        let limiter = RateLimiter::new(0.001, 3);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert!(limiter.wait_duration() > Duration::from_secs(1));
    }

    #[test]
    fn test_unlimited_always_admits() {
        let limiter = RateLimiter::unlimited();
        for _ in 0..1000 {
            assert!(limiter.try_acquire());
        }
        assert_eq!(limiter.wait_duration(), Duration::ZERO);
    }

    #[test]
    fn test_refills_over_time() {
        let limiter = RateLimiter::new(1000.0, 1);
        assert!(limiter.try_acquire());
        std::thread::sleep(Duration::from_millis(10));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_rate_limit_backs_off() {
        let limiter = RateLimiter::new(1000.0, 5);
        limiter.record_rate_limit(Some(1));
        assert!(!limiter.try_acquire());
        assert!(limiter.wait_duration() > Duration::from_secs(1));
    }
}
