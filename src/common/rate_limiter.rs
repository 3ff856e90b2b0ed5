//! Rate limiter implementation using token bucket algorithm
//!
//! Blocking flavour: callers sleep on the current thread until a permit is
//! available. Clones share one bucket, so every request path draws from the
//! same quota.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Configuration for the rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum requests allowed per refill interval
    pub max_requests: usize,
    /// Refill interval for tokens
    pub refill_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 120,
            refill_interval: Duration::from_secs(60),
        }
    }
}

impl RateLimiterConfig {
    pub fn with_rate(mut self, max_requests: usize) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn with_refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }
}

#[derive(Debug)]
struct Bucket {
    available: usize,
    last_refill: Instant,
}

/// Rate limiter using token bucket algorithm
///
/// # Example
///
/// ```
/// use strangle_screener::common::{RateLimiter, RateLimiterConfig};
///
/// let limiter = RateLimiter::new(RateLimiterConfig::default().with_rate(5));
/// // Acquire a permit before making a request
/// limiter.acquire();
/// assert_eq!(limiter.available_permits(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<Bucket>>,
    max_permits: usize,
    refill_interval: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: Arc::new(Mutex::new(Bucket {
                available: config.max_requests,
                last_refill: Instant::now(),
            })),
            max_permits: config.max_requests,
            refill_interval: config.refill_interval,
        }
    }

    /// Create a rate limiter with a specific per-minute budget
    pub fn per_minute(requests: usize) -> Self {
        Self::new(RateLimiterConfig::default().with_rate(requests))
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        // A poisoned bucket still holds a valid count
        self.bucket.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Acquire a permit, sleeping until the next refill if none are left.
    /// The permit is consumed.
    pub fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.lock();
                self.refill(&mut bucket);
                if bucket.available > 0 {
                    bucket.available -= 1;
                    return;
                }
                self.refill_interval
                    .saturating_sub(bucket.last_refill.elapsed())
            };
            tracing::debug!("Rate limiter exhausted, waiting {:?}", wait);
            thread::sleep(wait.max(Duration::from_millis(1)));
        }
    }

    /// Try to acquire a permit without blocking
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.lock();
        self.refill(&mut bucket);
        if bucket.available > 0 {
            bucket.available -= 1;
            true
        } else {
            false
        }
    }

    pub fn available_permits(&self) -> usize {
        self.lock().available
    }

    pub fn max_permits(&self) -> usize {
        self.max_permits
    }

    fn refill(&self, bucket: &mut Bucket) {
        if bucket.last_refill.elapsed() >= self.refill_interval {
            bucket.available = self.max_permits;
            bucket.last_refill = Instant::now();
        }
    }
}
