//! Token-bucket rate limiter
//!
//! One limiter exists per external API surface and is shared by the page loop,
//! its retries, and every fan-out detail task for that API. Tokens refill
//! continuously at `rate_per_sec` up to `burst`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::core::shutdown::ShutdownCoordinator;
use crate::core::sync::handle_mutex_poison;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limiter wait cancelled by shutdown")]
    Cancelled,

    #[error("rate limiter state unavailable: {message}")]
    Poisoned { message: String },
}

pub type RateLimitResult<T> = Result<T, RateLimitError>;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with sustained rate R and burst capacity B
#[derive(Debug)]
pub struct RateLimiter {
    rate_per_sec: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter that starts with a full bucket
    ///
    /// A non-positive rate is clamped to a tiny positive rate and a zero burst
    /// to one token; config validation rejects both before they get here.
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate_per_sec: if rate_per_sec > 0.0 { rate_per_sec } else { 1e-3 },
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn rate_per_sec(&self) -> f64 {
        self.rate_per_sec
    }

    pub fn burst(&self) -> u32 {
        self.burst as u32
    }

    /// Take a token if one is available, otherwise report how long until one is
    fn try_acquire(&self) -> RateLimitResult<Option<Duration>> {
        let mut bucket = handle_mutex_poison(self.bucket.lock(), |message| {
            RateLimitError::Poisoned { message }
        })?;

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(None);
        }

        let deficit = 1.0 - bucket.tokens;
        Ok(Some(Duration::from_secs_f64(deficit / self.rate_per_sec)))
    }

    /// Block until a token is available
    ///
    /// Cancel-safe: a dropped future has not consumed a token.
    pub async fn wait(&self) -> RateLimitResult<()> {
        while let Some(delay) = self.try_acquire()? {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Block until a token is available or shutdown is requested
    pub async fn wait_or_shutdown(&self, shutdown: &ShutdownCoordinator) -> RateLimitResult<()> {
        if shutdown.is_shutdown_requested() {
            return Err(RateLimitError::Cancelled);
        }
        tokio::select! {
            result = self.wait() => result,
            _ = shutdown.cancelled() => Err(RateLimitError::Cancelled),
        }
    }
}

impl crate::core::error_handling::ContextualError for RateLimitError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}
