//! Bounded retry with an optional delay schedule.
//!
//! Both the CAPTCHA loop (no delay, retry only on rejection) and the result
//! page fetch (exponential backoff, retry only on transient errors) run on
//! [`RetryPolicy::run`].

use std::future::Future;
use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately
    None,
    /// Wait `base * 2^(n-1)` after the n-th failed attempt
    Exponential {
        /// Delay after the first failure
        base: Duration,
    },
}

impl Backoff {
    /// Delay to wait after `failed_attempt` (1-based) before the next one.
    #[must_use]
    pub fn delay(&self, failed_attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Exponential { base } => {
                let shift = failed_attempt.saturating_sub(1).min(16);
                base.saturating_mul(1 << shift)
            }
        }
    }
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

/// A successful value with the attempt number that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    /// Value returned by the action
    pub value: T,
    /// 1-based attempt that succeeded
    pub attempts: u32,
}

/// Why a retried action gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The action failed with an error that is not worth retrying
    Aborted {
        /// The error
        error: E,
        /// Attempts made, including the failing one
        attempts: u32,
    },
    /// Every attempt failed with a retryable error
    Exhausted {
        /// Error from the final attempt
        last: E,
        /// Attempts made
        attempts: u32,
    },
}

impl RetryPolicy {
    /// Try up to `max_attempts` times (at least once) without delay.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::None,
        }
    }

    /// Set the delay schedule.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Maximum number of attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay schedule.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Run `action` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent.
    ///
    /// `action` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        mut action: F,
        is_retryable: P,
    ) -> Result<Attempted<T>, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match action(attempt).await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    })
                }
                Err(error) if !is_retryable(&error) => {
                    return Err(RetryError::Aborted {
                        error,
                        attempts: attempt,
                    })
                }
                Err(error) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        last: error,
                        attempts: attempt,
                    })
                }
                Err(error) => {
                    let delay = self.backoff.delay(attempt);
                    tracing::debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        ?delay,
                        error = %error,
                        "attempt failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
