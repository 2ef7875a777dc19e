// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed-schedule retry used by both metric delivery and database statements.
//!
//! The schedule is indexed by retry number, not exponential: the first retry
//! waits 1s, the second 3s, and every later one 5s. Waits abort as soon as the
//! shutdown token fires.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_MAX_RETRIES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    schedule: Vec<Duration>,
    max_retries: usize,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            schedule: vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(5),
            ],
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl Backoff {
    /// `schedule[i]` is the wait before retry `i + 1`; retries past the end
    /// reuse the last entry.
    pub fn new(schedule: Vec<Duration>, max_retries: usize) -> Self {
        Self {
            schedule,
            max_retries,
        }
    }

    /// Retries without waiting.
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            schedule: Vec::new(),
            max_retries,
        }
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Wait before the 1-based `retry`.
    pub fn delay(&self, retry: usize) -> Duration {
        if self.schedule.is_empty() || retry == 0 {
            return Duration::ZERO;
        }
        let idx = retry.min(self.schedule.len()) - 1;
        self.schedule[idx]
    }
}

#[derive(Debug, PartialEq)]
pub enum RetryError<E> {
    /// The error was not worth retrying.
    Permanent(E),
    /// Every retry failed; `attempts` counts the first try too.
    Exhausted { attempts: usize, source: E },
    /// Shutdown fired while waiting for the next attempt.
    Cancelled,
}

impl<E> RetryError<E> {
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Permanent(e) | RetryError::Exhausted { source: e, .. } => Some(e),
            RetryError::Cancelled => None,
        }
    }
}

/// Sleeps for `delay` unless `cancel` fires first. Returns `false` when cancelled.
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Runs `op` until it succeeds, returns an error `is_retriable` rejects, or
/// the retry budget runs out. `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut, R>(
    backoff: &Backoff,
    cancel: &CancellationToken,
    is_retriable: R,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_retriable(&err) {
            return Err(RetryError::Permanent(err));
        }
        if attempt > backoff.max_retries() {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                source: err,
            });
        }
        let delay = backoff.delay(attempt);
        debug!(
            "Attempt {attempt} failed: {err}. Retrying in {} ms",
            delay.as_millis()
        );
        if !pause(delay, cancel).await {
            debug!("Retry wait cancelled after attempt {attempt}");
            return Err(RetryError::Cancelled);
        }
        attempt += 1;
    }
}
