//! Bounded-attempt retry loop.
//!
//! [`RetryPolicy::run`] calls an async operation up to `attempts` times,
//! sleeping between attempts according to a [`Backoff`], and reports a
//! [`RetryOutcome`] instead of re-raising the last error.

use std::future::Future;
use std::time::Duration;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// `delay * 2^(n-1)` before retry `n`, capped at `2^5`.
    Exponential,
}

impl Backoff {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(Self::Fixed),
            "exponential" => Some(Self::Exponential),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Treated as at least 1.
    pub attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

/// How a retried operation ended.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success { value: T, attempts: u32 },
    /// Every attempt failed with a retryable error.
    Exhausted { last_error: E, attempts: u32 },
    /// An error the caller marked as not worth retrying.
    Aborted { error: E, attempts: u32 },
}

impl RetryPolicy {
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Sleep before attempt `attempt` (1-based; attempt 1 never waits).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => self.delay * (1u32 << (attempt - 2).min(5)),
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    pub async fn run<T, E, F, Fut>(&self, mut op: F, is_retryable: impl Fn(&E) -> bool) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            let wait = self.delay_before(attempt);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            match op(attempt).await {
                Ok(value) => {
                    return RetryOutcome::Success {
                        value,
                        attempts: attempt,
                    }
                }
                Err(error) if !is_retryable(&error) => {
                    return RetryOutcome::Aborted {
                        error,
                        attempts: attempt,
                    }
                }
                Err(error) if attempt >= attempts => {
                    return RetryOutcome::Exhausted {
                        last_error: error,
                        attempts: attempt,
                    }
                }
                Err(error) => {
                    tracing::warn!(attempt, max_attempts = attempts, error = %error, "attempt failed, retrying");
                    attempt += 1;
                }
            }
        }
    }
}
