//! Bounded-attempt retry policy with fixed or exponential backoff.
//!
//! One policy type covers both places the collector retries:
//! - the whole run, wrapped by `main` with a fixed delay between attempts
//! - each thumbnail upload, retried with exponential backoff and jitter
//!
//! # Backoff Strategy
//!
//! ```text
//! fixed:       delay = base_delay
//! exponential: delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter_ms)
//! ```

use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, warn};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    Exponential,
}

/// A bounded number of attempts separated by a backoff delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: usize,
    pub backoff: Backoff,
    /// Delay before the second attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for exponential growth, in milliseconds.
    pub max_delay_ms: u64,
    /// Random extra delay added to exponential backoff, in milliseconds.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Retry with a constant delay and no jitter.
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed,
            base_delay_ms: delay.as_millis() as u64,
            max_delay_ms: delay.as_millis() as u64,
            jitter_ms: 0,
        }
    }

    /// Retry with doubling delay capped at 30 seconds, plus up to 250ms jitter.
    pub fn exponential(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential,
            base_delay_ms: base_delay.as_millis() as u64,
            max_delay_ms: 30_000,
            jitter_ms: 250,
        }
    }

    /// Delay to wait after the given failed attempt (1-based), jitter excluded.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let base = Duration::from_millis(self.base_delay_ms);
        match self.backoff {
            Backoff::Fixed => base,
            Backoff::Exponential => {
                let shift = attempt.saturating_sub(1).min(16) as u32;
                let delay = base.saturating_mul(1u32 << shift);
                delay.min(Duration::from_millis(self.max_delay_ms))
            }
        }
    }

    /// Run `op` until it succeeds, returns a non-retryable error, or attempts run out.
    ///
    /// `retryable` decides whether an error is worth another attempt; the last
    /// error is returned unchanged when retrying stops.
    pub async fn run<T, E, F, Fut, R>(&self, label: &str, mut op: F, retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        let total_t0 = Instant::now();
        let max = self.max_attempts.max(1);
        let mut attempt = 0usize;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt >= max || !retryable(&e) {
                        error!(
                            %label,
                            attempt,
                            max,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "giving up"
                        );
                        return Err(e);
                    }

                    let mut delay = self.delay_for(attempt);
                    if self.backoff == Backoff::Exponential && self.jitter_ms > 0 {
                        let jitter: u64 = rng().random_range(0..=self.jitter_ms);
                        delay += Duration::from_millis(jitter);
                    }

                    warn!(
                        %label,
                        attempt,
                        max,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quick(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::Exponential,
            base_delay_ms: 1,
            max_delay_ms: 4,
            jitter_ms: 0,
        }
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy = RetryPolicy::exponential(5, Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(30));
        assert_eq!(policy.delay_for(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for(3), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_run_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<u32, String> = quick(3)
            .run(
                "test",
                || {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move { if n < 3 { Err(format!("fail {n}")) } else { Ok(7) } }
                },
                |_| true,
            )
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_run_stops_at_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), String> = quick(2)
            .run(
                "test",
                || {
                    calls.set(calls.get() + 1);
                    async { Err("always".to_string()) }
                },
                |_| true,
            )
            .await;
        assert_eq!(result, Err("always".to_string()));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_run_does_not_retry_permanent_errors() {
        let calls = Cell::new(0);
        let result: Result<(), String> = quick(5)
            .run(
                "test",
                || {
                    calls.set(calls.get() + 1);
                    async { Err("permanent".to_string()) }
                },
                |e| !e.starts_with("permanent"),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
