use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Retry-with-backoff policy shared by every component that wraps I/O.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// `base * 2^attempt` when true, fixed `base` otherwise.
    #[serde(default = "default_exponential_backoff")]
    pub exponential_backoff: bool,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound of the random extra delay, as a fraction of the computed delay.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            exponential_backoff: default_exponential_backoff(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_exponential_backoff() -> bool { true }
fn default_max_delay_ms() -> u64 { 10_000 }
fn default_jitter_ratio() -> f64 { 0.1 }

/// Successful result of [`RetryPolicy::run`].
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
}

/// Final failure of [`RetryPolicy::run`]: the last error and how far we got.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub error: E,
    pub attempts: u32,
    pub cancelled: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            ..Default::default()
        }
    }

    /// Fixed delay between attempts, no growth and no jitter.
    pub fn fixed(max_retries: u32, delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms: delay_ms,
            exponential_backoff: false,
            jitter_ratio: 0.0,
            ..Default::default()
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retrying after the zero-based `attempt` failed, without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let ms = if self.exponential_backoff {
            let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
            self.base_delay_ms.saturating_mul(factor)
        } else {
            self.base_delay_ms
        };
        Duration::from_millis(ms.min(self.max_delay_ms))
    }

    /// Delay before retrying after the zero-based `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for(attempt).as_millis() as u64;
        if !self.exponential_backoff || self.jitter_ratio <= 0.0 {
            return Duration::from_millis(base);
        }
        let jitter = (base as f64 * self.jitter_ratio * rand::random::<f64>()) as u64;
        Duration::from_millis(base.saturating_add(jitter).min(self.max_delay_ms))
    }

    /// Run `op` until it succeeds, a non-retryable error occurs, retries run
    /// out, or `cancel` fires during a delay.
    ///
    /// `op` receives the zero-based attempt number. Attempts are strictly
    /// sequential: each delay is fully awaited before the next call.
    pub async fn run<T, E, F, Fut, R>(
        &self,
        mut op: F,
        is_retryable: R,
        cancel: Option<&CancellationToken>,
    ) -> Result<RetryOutcome<T>, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0u32;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    return Ok(RetryOutcome {
                        value,
                        attempts: attempt + 1,
                    })
                }
                Err(error) => {
                    let attempts = attempt + 1;
                    if attempt >= self.max_retries || !is_retryable(&error) {
                        return Err(RetryFailure {
                            error,
                            attempts,
                            cancelled: false,
                        });
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        attempt = attempts,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after failure"
                    );

                    match cancel {
                        Some(token) => {
                            tokio::select! {
                                _ = token.cancelled() => {
                                    return Err(RetryFailure {
                                        error,
                                        attempts,
                                        cancelled: true,
                                    });
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }
                    attempt += 1;
                }
            }
        }
    }
}
