use crate::rate_limit::{RateLimitConfig, ResourceCategory};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest single wait, also used when the computed wait overflows a `Duration`.
const MAX_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(qps: f32, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));

        Self {
            capacity,
            tokens: capacity,
            rate: f64::from(qps),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes a token or returns how long to wait until one is available.
    fn try_consume(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let wait = Duration::try_from_secs_f64((1.0 - self.tokens) / self.rate)
                .unwrap_or(MAX_WAIT);

            Err(wait.min(MAX_WAIT))
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Direction {
    Read,
    Write,
}

/// Read and write token buckets for a single resource category.
///
/// A disabled config, or one with a non-positive rate, never throttles.
#[derive(Debug)]
pub struct RateLimiter {
    category: ResourceCategory,
    read: Option<Mutex<TokenBucket>>,
    write: Option<Mutex<TokenBucket>>,
}

impl RateLimiter {
    pub fn new(category: ResourceCategory, config: &RateLimitConfig) -> Self {
        let bucket = |qps: f32, burst: u32| {
            if config.enabled && qps > 0.0 {
                Some(Mutex::new(TokenBucket::new(qps, burst)))
            } else {
                None
            }
        };

        Self {
            category,
            read: bucket(config.qps, config.bucket),
            write: bucket(config.qps_write, config.bucket_write),
        }
    }

    pub fn category(&self) -> ResourceCategory {
        self.category
    }

    pub fn try_acquire_read(&self) -> bool {
        try_acquire(&self.read).is_ok()
    }

    pub fn try_acquire_write(&self) -> bool {
        try_acquire(&self.write).is_ok()
    }

    pub async fn acquire_read(&self) {
        self.acquire(&self.read, Direction::Read).await
    }

    pub async fn acquire_write(&self) {
        self.acquire(&self.write, Direction::Write).await
    }

    async fn acquire(&self, bucket: &Option<Mutex<TokenBucket>>, direction: Direction) {
        loop {
            let wait = match try_acquire(bucket) {
                Ok(()) => return,
                Err(wait) => wait,
            };

            debug!(
                category = %self.category,
                ?direction,
                wait_ms = wait.as_millis() as u64,
                "Rate limit exceeded, waiting for a token"
            );

            tokio::time::sleep(wait).await;
        }
    }
}

fn try_acquire(bucket: &Option<Mutex<TokenBucket>>) -> Result<(), Duration> {
    match bucket {
        Some(bucket) => bucket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_consume(),
        None => Ok(()),
    }
}
