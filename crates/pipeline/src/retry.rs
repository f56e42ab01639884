//! Bounded retry around a fallible remote call
//!
//! Every attempt runs under its own timeout. Only transient failures
//! (timeouts, unavailable dependencies, transport errors) are resubmitted,
//! after a short jittered pause.

use geoqa_common::config::LlmConfig;
use geoqa_common::errors::{AppError, Result};
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

/// Hard ceiling on attempts per call
pub const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    attempt_timeout: Duration,
    backoff: Duration,
}

/// What happened on one attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptReport {
    pub attempt: u32,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl AttemptReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Final result plus one report per attempt made
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: Vec<AttemptReport>,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to `1..=MAX_ATTEMPTS`
    pub fn new(max_attempts: u32, attempt_timeout: Duration, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS),
            attempt_timeout,
            backoff,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.max_attempts(), config.timeout(), config.retry_backoff())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Run `call` until it succeeds, fails permanently or attempts run out.
    /// `call` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = Vec::with_capacity(self.max_attempts as usize);
        let mut attempt = 1;

        loop {
            let started = Instant::now();
            let result = match tokio::time::timeout(self.attempt_timeout, call(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: self.attempt_timeout.as_millis() as u64,
                }),
            };

            attempts.push(AttemptReport {
                attempt,
                elapsed: started.elapsed(),
                error: result.as_ref().err().map(|e| e.to_string()),
            });

            let error = match result {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                    }
                }
                Err(error) => error,
            };

            if attempt >= self.max_attempts || !error.is_transient() {
                return RetryOutcome {
                    result: Err(error),
                    attempts,
                };
            }

            warn!(operation, attempt, error = %error, "Transient failure, retrying");
            tokio::time::sleep(self.jittered_backoff()).await;
            attempt += 1;
        }
    }

    fn jittered_backoff(&self) -> Duration {
        let base = self.backoff.as_millis() as u64;
        if base == 0 {
            return Duration::ZERO;
        }
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        Duration::from_millis(base + jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}
