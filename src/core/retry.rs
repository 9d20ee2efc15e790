//! Retry policy for rate-limited remote calls
//!
//! Failures are classified by the caller's provider client. Retryable failures
//! (throttling signals) sleep a fixed delay and then re-acquire a rate limiter
//! token before the next attempt; fatal failures return immediately. The
//! attempt bound is part of the policy so page and per-item budgets can differ.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;

use crate::core::rate_limit::{RateLimitError, RateLimiter};
use crate::core::shutdown::ShutdownCoordinator;

/// Outcome of classifying a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

/// Bounded fixed-delay retry policy
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: usize,
    #[serde(rename = "delay_ms", with = "duration_ms")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Budget for page fetches: losing a page loses the scan
    pub fn page_default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }

    /// Budget for per-item detail calls: losing one item is tolerable
    pub fn item_default() -> Self {
        Self::new(25, Duration::from_millis(1000))
    }
}

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryError<E: fmt::Display> {
    #[error("fatal failure on attempt {attempt}: {last_error}")]
    Fatal { attempt: usize, last_error: E },

    #[error("retry budget exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: usize, last_error: E },

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
}

/// Run `operation` under `policy`, taking a limiter token before every attempt
///
/// The operation is attempted at most `policy.max_attempts` times (minimum one).
pub async fn retry_classified<T, E, F, Fut, C>(
    operation_name: &str,
    policy: &RetryPolicy,
    limiter: &RateLimiter,
    shutdown: &ShutdownCoordinator,
    classify: C,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> ErrorClass,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    let last_error = loop {
        attempt += 1;
        limiter.wait_or_shutdown(shutdown).await?;

        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if classify(&error) == ErrorClass::Fatal {
            return Err(RetryError::Fatal {
                attempt,
                last_error: error,
            });
        }

        if attempt >= max_attempts {
            break error;
        }

        log::debug!(
            "'{}' throttled on attempt {}/{}, retrying in {:?}: {}",
            operation_name,
            attempt,
            max_attempts,
            policy.delay,
            error
        );
        sleep(policy.delay).await;
    };

    Err(RetryError::Exhausted {
        attempts: attempt,
        last_error,
    })
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
