//! Exponential backoff with jitter.
//!
//! Shared by the HTTP fetcher (transient network errors, 5xx, 429) and the
//! model client in [`crate::analysis`].
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```

use rand::{Rng, rng};
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, warn};

/// Retry schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Retries after the first attempt; `0` disables retrying.
    pub max_retries: usize,
    /// Delay before the first retry; doubled for every further one.
    pub base_delay: Duration,
    /// Ceiling for the doubled delay, before jitter.
    pub max_delay: Duration,
    /// Upper bound of the random extra delay added to every wait.
    pub jitter: Duration,
}

impl Backoff {
    /// Schedule with the default 250ms jitter.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Retries after the first attempt
    /// * `base_delay` - Delay before the first retry
    /// * `max_delay` - Cap on the exponential delay
    pub fn new(max_retries: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: Duration::from_millis(250),
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn base_delay_for(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(31) as u32;
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=jitter_ms)
        };
        self.base_delay_for(attempt) + Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    ///
    /// # Arguments
    ///
    /// * `label` - Name of the operation in log lines
    /// * `is_retryable` - Whether an error is worth another attempt
    /// * `op` - Produces a fresh future for every attempt
    ///
    /// # Returns
    ///
    /// The first success, or the last error once retrying stops.
    pub async fn retry<T, E, F, Fut>(
        &self,
        label: &str,
        is_retryable: impl Fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    let elapsed_ms_total = total_t0.elapsed().as_millis();

                    if !is_retryable(&e) {
                        return Err(e);
                    }
                    if attempt > self.max_retries {
                        if self.max_retries > 0 {
                            error!(
                                label,
                                attempt,
                                max = self.max_retries,
                                elapsed_ms_total,
                                error = %e,
                                "Retries exhausted"
                            );
                        }
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        label,
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total,
                        ?delay,
                        error = %e,
                        "Attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
