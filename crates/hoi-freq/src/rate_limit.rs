use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

/// Token bucket shared by every worker of a batch so the outbound request
/// rate stays under the service's limits.
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    rate_per_sec: f64,
    burst: f64,
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// `rate_per_sec` and `burst` are clamped to at least 1.
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        let burst = burst.max(1) as f64;
        Self {
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
            rate_per_sec: rate_per_sec.max(1) as f64,
            burst,
        }
    }

    /// Wait until a request token is available and consume it.
    pub async fn acquire(&self) {
        loop {
            let Some(wait) = self.try_consume(Instant::now()) else {
                return;
            };
            debug!("rate limited, waiting {} ms", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }

    /// Consume a token if one is available at `now`, otherwise return how long
    /// until the next one is.
    fn try_consume(&self, now: Instant) -> Option<Duration> {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = now
            .saturating_duration_since(bucket.last_refill)
            .as_secs_f64();
        if elapsed > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst);
            bucket.last_refill = now;
        }
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64(
                (1.0 - bucket.tokens) / self.rate_per_sec,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_refill() {
        let limiter = RateLimiter::new(2, 3);
        let start = Instant::now();
        for _ in 0..3 {
            assert_eq!(limiter.try_consume(start), None);
        }
        let wait = limiter.try_consume(start).expect("bucket drained");
        assert!(wait <= Duration::from_millis(500));

        let later = start + Duration::from_millis(500);
        assert_eq!(limiter.try_consume(later), None);
        assert!(limiter.try_consume(later).is_some());
    }

    #[test]
    fn refill_is_capped_at_burst() {
        let limiter = RateLimiter::new(10, 2);
        let later = Instant::now() + Duration::from_secs(60);
        assert_eq!(limiter.try_consume(later), None);
        assert_eq!(limiter.try_consume(later), None);
        assert!(limiter.try_consume(later).is_some());
    }

    #[tokio::test]
    async fn acquire_waits_for_a_token() {
        let limiter = RateLimiter::new(20, 1);
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
