//! Retry executor: re-invoke a rate-limited call with exponential backoff.
//!
//! ## Retry Strategy
//!
//! Only [`GenerationError::RateLimited`] is retried. A 429 or an exhausted
//! quota is transient by definition; anything else (bad request, malformed
//! payload, auth) will fail the same way again, so it is returned after the
//! first attempt. The delay doubles after every retry with no jitter and no
//! upper bound: with the default 3 s base and 3 retries the waits are
//! 3 s → 6 s → 12 s. A caller that needs a wall-clock bound must wrap the
//! whole call in its own timeout.

use crate::error::GenerationError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry budget and initial delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Total attempts = `retries + 1`.
    pub retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            initial_delay: Duration::from_millis(3000),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, initial_delay: Duration) -> Self {
        Self {
            retries,
            initial_delay,
        }
    }
}

/// Run `op`, retrying rate-limited failures according to `policy`.
///
/// `on_backoff(attempt, delay)` is called right before each wait, with the
/// 1-based number of the retry that follows. The first non-rate-limit error,
/// or the last rate-limit error once the budget is spent, is returned
/// unchanged.
pub async fn with_retry<T, F, Fut, B>(
    policy: &RetryPolicy,
    mut on_backoff: B,
    mut op: F,
) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
    B: FnMut(u32, Duration),
{
    let mut remaining = policy.retries;
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_rate_limited() && remaining > 0 => {
                attempt += 1;
                warn!(
                    "Rate limited, retry {}/{} after {}ms: {}",
                    attempt,
                    policy.retries,
                    delay.as_millis(),
                    e
                );
                on_backoff(attempt, delay);
                sleep(delay).await;
                remaining -= 1;
                delay = delay.saturating_mul(2);
            }
            Err(e) => return Err(e),
        }
    }
}
