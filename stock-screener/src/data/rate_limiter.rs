//! Token bucket rate limiter for vendor API throttling.
//!
//! Free market data tiers reject bursts outright, so every adapter takes a
//! token before each request instead of reacting to 429 responses.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket refilled continuously at `requests_per_minute / 60` tokens
/// per second, holding at most one second worth of requests.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

/// Limiter shared between clones of an adapter.
pub type SharedRateLimiter = Arc<RateLimiter>;

impl RateLimiter {
    /// Create a limiter allowing `requests_per_minute` (minimum 1).
    pub fn new(name: impl Into<String>, requests_per_minute: u32) -> Self {
        let rpm = f64::from(requests_per_minute.max(1));
        let capacity = (rpm / 60.0).ceil().max(1.0);

        Self {
            name: name.into(),
            capacity,
            refill_per_sec: rpm / 60.0,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn shared(name: impl Into<String>, requests_per_minute: u32) -> SharedRateLimiter {
        Arc::new(Self::new(name, requests_per_minute))
    }

    /// Take a token, sleeping until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                let missing = 1.0 - bucket.tokens;
                Duration::from_secs_f64(missing / self.refill_per_sec)
            };

            debug!(
                limiter = %self.name,
                wait_ms = wait.as_millis() as u64,
                "Rate limit reached, waiting for token"
            );
            tokio::time::sleep(wait.max(Duration::from_millis(10))).await;
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;
    }
}
