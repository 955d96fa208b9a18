//! Bounded retry against a single backend.
//!
//! Only transient failures are retried; anything else returns after the
//! first attempt so the fallback chain can move on immediately.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;

use switchboard_types::config::RetrySettings;

/// Exponential backoff policy without jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            multiplier: if multiplier.is_finite() && multiplier >= 1.0 {
                multiplier
            } else {
                1.0
            },
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.initial_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
            settings.multiplier,
        )
    }

    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.initial_delay,
            max_interval: self.max_delay,
            multiplier: self.multiplier,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }

    /// The sequence of delays slept between attempts.
    pub fn delays(&self) -> Vec<Duration> {
        let mut backoff = self.backoff();
        (1..self.max_attempts)
            .map(|_| backoff.next_backoff().unwrap_or(self.max_delay))
            .collect()
    }

    /// Run `op` until it succeeds, fails non-transiently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. Returns the last outcome and
    /// the number of attempts made.
    pub async fn run<T, Fut, Op, Retry>(&self, mut op: Op, is_transient: Retry) -> (T, u32)
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = T>,
        Retry: Fn(&T) -> bool,
    {
        let mut backoff = self.backoff();
        let mut attempt = 1;
        loop {
            let outcome = op(attempt).await;
            if attempt >= self.max_attempts || !is_transient(&outcome) {
                return (outcome, attempt);
            }

            let delay = backoff.next_backoff().unwrap_or(self.max_delay);
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Transient failure, retrying same provider"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}
