//! Backoff for persistence writes.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use flowhands_protocols::error::PersistenceError;

/// Exponential backoff for status writes. Delay for attempt `n` is
/// `base_delay * backoff_multiplier^n`, capped at `max_delay`, with up to 10%
/// jitter either way when enabled.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let ceiling = self.max_delay.as_nanos() as f64;
        let mut nanos = (self.base_delay.as_nanos() as f64
            * self.backoff_multiplier.powi(exponent))
        .min(ceiling);
        if self.jitter {
            nanos *= 1.0 + jitter_factor() * 0.1;
        }
        Duration::from_nanos(nanos.max(0.0).round() as u64)
    }

    /// Run `operation` until it succeeds, fails permanently or the attempts
    /// run out. Returns the result and the number of retries spent.
    pub async fn run<F, Fut, T>(
        &self,
        label: &str,
        operation: F,
    ) -> (Result<T, PersistenceError>, u32)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, PersistenceError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if !is_retryable(&e) || attempt == self.max_retries => {
                    return (Err(e), attempt);
                }
                Err(e) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        label,
                        attempt + 1,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Pseudo-random value in `[-1, 1)` taken from the clock's sub-second nanos.
fn jitter_factor() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.subsec_nanos());
    f64::from(nanos % 1_000_000) / 500_000.0 - 1.0
}

/// Only backend failures are worth another attempt.
pub fn is_retryable(error: &PersistenceError) -> bool {
    matches!(error, PersistenceError::Storage(_))
}
