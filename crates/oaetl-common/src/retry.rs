//! Bounded retry with exponential backoff
//!
//! Remote listing and download calls go through [`retry_with_backoff`]. After
//! the n-th failed attempt (counting from zero) the caller sleeps
//! `base_delay * 2^n` before trying again, up to `max_attempts` attempts in
//! total. The last error is returned once attempts are exhausted.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of attempts for remote operations
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between attempts
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);

/// Ceiling on the backoff exponent so the delay computation cannot overflow
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A policy that retries without sleeping, for tests and local sources
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Delay to wait after the given zero-based failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// `op` receives the one-based attempt number so callers can log or reset
/// per-attempt state (for example, remove a partially written file).
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        debug!(operation, attempt = attempt + 1, max_attempts, "Attempting");

        match op(attempt + 1).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 >= max_attempts => {
                warn!(operation, attempts = max_attempts, error = %e, "Giving up");
                return Err(e);
            },
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %e,
                    delay_secs = delay.as_secs_f64(),
                    "Attempt failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            },
        }
    }
}
