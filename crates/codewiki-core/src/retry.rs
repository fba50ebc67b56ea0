//! Bounded retries under a hard deadline.
//!
//! [`RetryPolicy`] re-runs an operation after recoverable failures with a
//! fixed delay. [`Deadline`] wraps the whole retry loop, delays included, in a
//! single budget. [`Orchestrator`] composes the two and reports how many
//! attempts were made, whatever the outcome.
//!
//! ```text
//! Deadline ─┬─ attempt 1 ── fail (recoverable) ── sleep ─┐
//!           │  attempt 2 ◀───────────────────────────────┘
//!           └─ budget elapsed → TIMEOUT or RETRY_EXHAUSTED
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::{Config, Error, Result};

/// Fixed-delay retry for recoverable errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Policy from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.retry.max_attempts.max(1),
            delay: config.retry_delay(),
        }
    }

    /// A policy that never retries.
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of
    /// attempts. `op` receives the 1-based attempt number.
    ///
    /// Running out of attempts yields [`Error::RetryExhausted`] wrapping the
    /// last failure, unless only one attempt was allowed, in which case the
    /// failure is returned as is.
    pub async fn run<F, Fut, T>(&self, log: &AttemptLog, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            log.begin(attempt);
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "succeeded after retry");
                    }
                    return Ok(value);
                },
                Err(e) if e.is_recoverable() && attempt < max => {
                    warn!(
                        attempt,
                        max_attempts = max,
                        category = e.category(),
                        "transient failure, retrying in {}s: {e}",
                        self.delay.as_secs()
                    );
                    log.fail(e);
                    tokio::time::sleep(self.delay).await;
                },
                Err(e) if e.is_recoverable() && max > 1 => {
                    warn!(attempts = attempt, category = e.category(), "retries exhausted: {e}");
                    return Err(Error::RetryExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                },
                Err(e) => return Err(e),
            }
        }
    }
}

/// Progress of one orchestrated call, shared between the retry loop and the
/// deadline that may cancel it.
#[derive(Debug, Default)]
pub struct AttemptLog {
    attempt: AtomicU32,
    last_failure: Mutex<Option<Error>>,
}

impl AttemptLog {
    fn begin(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::Release);
    }

    fn fail(&self, error: Error) {
        *self.last_failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Attempt currently (or last) running; zero before the first.
    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Acquire)
    }

    /// Error for a deadline that fired now.
    ///
    /// If an earlier attempt already failed with something other than a
    /// timeout, that failure is the more useful diagnosis.
    fn deadline_error(&self, budget: Duration) -> Error {
        let last = self.last_failure.lock().unwrap_or_else(PoisonError::into_inner).take();
        match last {
            Some(last) if !matches!(last, Error::Timeout(_)) => Error::RetryExhausted {
                attempts: self.attempt(),
                last: Box::new(last),
            },
            _ => Error::Timeout(format!("operation exceeded the {}s limit", budget.as_secs())),
        }
    }
}

/// Hard upper bound on a whole call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    /// Total budget.
    pub budget: Duration,
}

impl Deadline {
    /// Run `fut`, abandoning it when the budget elapses.
    pub async fn run<Fut, T>(&self, log: &AttemptLog, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.budget, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(budget_secs = self.budget.as_secs(), attempt = log.attempt(), "hard deadline hit");
                Err(log.deadline_error(self.budget))
            },
        }
    }
}

/// Result plus attempt bookkeeping.
#[derive(Debug)]
pub struct Attempted<T> {
    /// Outcome.
    pub result: Result<T>,
    /// Attempts made; at least one.
    pub attempt: u32,
    /// Attempts allowed.
    pub max_attempts: u32,
}

impl<T> Attempted<T> {
    /// A value that needed no upstream call.
    pub const fn immediate(value: T, max_attempts: u32) -> Self {
        Self {
            result: Ok(value),
            attempt: 1,
            max_attempts,
        }
    }

    /// Transform the success value, keeping the bookkeeping.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Attempted<U> {
        Attempted {
            result: self.result.map(f),
            attempt: self.attempt,
            max_attempts: self.max_attempts,
        }
    }

    /// Chain a fallible step, keeping the bookkeeping.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Result<U>) -> Attempted<U> {
        Attempted {
            result: self.result.and_then(f),
            attempt: self.attempt,
            max_attempts: self.max_attempts,
        }
    }
}

/// Retry policy inside a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orchestrator {
    /// Per-attempt policy.
    pub retry: RetryPolicy,
    /// Budget for all attempts together.
    pub deadline: Deadline,
}

impl Orchestrator {
    /// Retries and hard timeout from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: RetryPolicy::from_config(config),
            deadline: Deadline {
                budget: config.hard_timeout(),
            },
        }
    }

    /// Same deadline, one attempt. Used for calls with side effects.
    pub const fn single_attempt(self) -> Self {
        Self {
            retry: RetryPolicy::once(),
            deadline: self.deadline,
        }
    }

    /// Run `op` under the retry policy and the deadline.
    pub async fn run<F, Fut, T>(&self, op: F) -> Attempted<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let log = AttemptLog::default();
        let result = self.deadline.run(&log, self.retry.run(&log, op)).await;
        Attempted {
            result,
            attempt: log.attempt().max(1),
            max_attempts: self.retry.max_attempts.max(1),
        }
    }
}
