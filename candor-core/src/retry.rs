//! Retry policies shared by the ledger submitter and both pipelines.
//!
//! A policy is a bounded attempt count, a backoff schedule and a predicate that
//! decides which errors are worth another attempt. Execution is delegated to
//! `backoff::future::retry_notify`; the schedule is a fixed-length linear
//! sequence rather than the exponential default so attempt counts are exact.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::backoff::Backoff;
use tracing::warn;

use crate::ledger::LedgerError;
use crate::persistence::StorageError;

/// Wait applied after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Retry right away.
    Immediate,
    /// Attempt `n` waits `n * base` after failing.
    Linear(Duration),
}

impl Delay {
    pub fn after_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::Immediate => Duration::ZERO,
            Self::Linear(base) => base.saturating_mul(attempt),
        }
    }
}

/// Backoff schedule that yields `max_attempts - 1` waits and then stops.
#[derive(Debug, Clone)]
pub struct AttemptBackoff {
    delay: Delay,
    max_attempts: u32,
    failed: u32,
}

impl AttemptBackoff {
    pub fn new(max_attempts: u32, delay: Delay) -> Self {
        Self {
            delay,
            max_attempts: max_attempts.max(1),
            failed: 0,
        }
    }
}

impl Backoff for AttemptBackoff {
    fn reset(&mut self) {
        self.failed = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.failed += 1;
        if self.failed >= self.max_attempts {
            None
        } else {
            Some(self.delay.after_attempt(self.failed))
        }
    }
}

/// Last error of a policy run together with how many attempts were made.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub error: E,
}

pub struct RetryPolicy<E> {
    name: &'static str,
    max_attempts: u32,
    delay: Delay,
    retryable: fn(&E) -> bool,
}

impl<E> RetryPolicy<E> {
    pub fn new(
        name: &'static str,
        max_attempts: u32,
        delay: Delay,
        retryable: fn(&E) -> bool,
    ) -> Self {
        Self {
            name,
            max_attempts: max_attempts.max(1),
            delay,
            retryable,
        }
    }

    /// Exactly one attempt, nothing is retried.
    pub fn single_attempt(name: &'static str) -> Self {
        Self::new(name, 1, Delay::Immediate, |_| false)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Delay {
        self.delay
    }

    /// Run `operation` under this policy. The closure receives the 1-based
    /// attempt number. On success returns the value and the attempts used.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<(T, u32), RetryFailure<E>>
    where
        E: fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = AtomicU32::new(0);
        let retryable = self.retryable;
        let name = self.name;
        let max_attempts = self.max_attempts;

        let result = backoff::future::retry_notify(
            AttemptBackoff::new(self.max_attempts, self.delay),
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let fut = operation(attempt);
                async move {
                    fut.await.map_err(|err| {
                        if retryable(&err) {
                            backoff::Error::transient(err)
                        } else {
                            backoff::Error::permanent(err)
                        }
                    })
                }
            },
            |err: E, wait: Duration| {
                warn!(
                    policy = name,
                    attempt = attempts.load(Ordering::SeqCst),
                    max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying"
                );
            },
        )
        .await;

        let attempts = attempts.load(Ordering::SeqCst);
        match result {
            Ok(value) => Ok((value, attempts)),
            Err(error) => Err(RetryFailure { attempts, error }),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish()
    }
}

impl RetryPolicy<LedgerError> {
    /// Verify path: retry only on a stale block reference, with no wait since
    /// every attempt fetches a fresh reference anyway.
    pub fn stale_block_ref(retries: u32) -> Self {
        Self::new(
            "ledger-stale-block-ref",
            retries.saturating_add(1),
            Delay::Immediate,
            LedgerError::is_stale_block_ref,
        )
    }
}

impl RetryPolicy<StorageError> {
    /// Off-chain writes after a confirmed (or skipped) ledger step.
    pub fn persistence(attempts: u32, base_delay: Duration) -> Self {
        Self::new(
            "db-write",
            attempts,
            Delay::Linear(base_delay),
            StorageError::is_transient,
        )
    }
}
