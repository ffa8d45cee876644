//! Reusable retry policy for upstream requests.
//!
//! A [`RetryPolicy`] runs an async operation up to `max_attempts` times,
//! sleeping between attempts, and stops early when the caller's predicate
//! says an error is not worth retrying.
//!
//! # Usage
//!
//! ```ignore
//! let policy = RetryPolicy::from_config(&profile.retry);
//! let elements = policy
//!     .run("district 4", |_| source.fetch(&query), StreetError::is_transient)
//!     .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use canvass_map_street_models::profile::{Backoff, RetryConfig};

/// Upper bound for a single exponential delay.
const MAX_DELAY: Duration = Duration::from_secs(300);

/// Attempt budget and spacing for a retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff,
        }
    }

    /// Builds the policy described by a profile's `[retry]` table.
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.delay(), config.backoff)
    }

    /// Total attempts, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay slept before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_before(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 1u32 << retry.saturating_sub(1).min(16);
                self.delay.saturating_mul(factor).min(MAX_DELAY)
            }
        }
    }

    /// Runs `op` until it succeeds, the error is not retryable, or the
    /// attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError`] carrying the last error and the number of
    /// attempts made.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut op: F,
        is_retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;

        loop {
            log::debug!("{label}: attempt {attempt}/{}", self.max_attempts);

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !is_retryable(&e) {
                        log::warn!("{label}: non-retryable error on attempt {attempt}: {e}");
                        return Err(RetryError {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    if attempt >= self.max_attempts {
                        log::warn!(
                            "{label}: giving up after {attempt} attempt(s), last error: {e}"
                        );
                        return Err(RetryError {
                            attempts: attempt,
                            source: e,
                        });
                    }

                    let delay = self.delay_before(attempt);
                    log::warn!(
                        "{label}: {e}, retry {attempt}/{} in {delay:?}...",
                        self.max_attempts - 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// The error left over once a [`RetryPolicy`] stops retrying.
#[derive(Debug)]
pub struct RetryError<E> {
    /// Attempts made before giving up.
    pub attempts: u32,
    /// The last error seen.
    pub source: E,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} attempt(s))", self.source, self.attempts)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
