//! Bounded retry of fallible async operations.
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries).
//! - Every `Err` is retried until the budget is spent; the first `Ok` is returned as-is.
//! - The delay before attempt `k + 1` is `backoff.delay(k)`: the initial interval, multiplied
//!   after each failure and capped (see [`Backoff::from_retry_config`]).
//! - When the last attempt fails the policy returns [`RetryExhausted`] wrapping that failure.
//! - Each failed attempt, the final success and exhaustion are reported to the event sink.
//!
//! This is for operations that fail transiently (a broker RPC). Waiting for a query *result*
//! to converge is [`Poller`](crate::poll::Poller)'s job.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use postrelay::{Backoff, InstantSleeper, RetryPolicy};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3) // total attempts
//!     .backoff(Backoff::exponential(Duration::from_millis(100)))
//!     .with_sleeper(InstantSleeper)
//!     .build()
//!     .unwrap();
//! let result = policy.execute("always_fails", || async { Err::<(), _>("oops") }).await;
//! assert_eq!(result.unwrap_err().attempts, 3);
//! # });
//! ```

use crate::backoff::{Backoff, BackoffError};
use crate::config::RetryConfig;
use crate::error::RetryExhausted;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::telemetry::{EventSink, NullSink, RelayEvent, RetryEvent};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Retry policy combining an attempt budget, backoff, sleeper and event sink.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("sleeper", &self.sleeper)
            .field("sink", &"<sink>")
            .finish()
    }
}

impl RetryPolicy {
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Policy shaped by `cfg`, sleeping on the tokio timer and discarding events.
    pub fn from_config(cfg: &RetryConfig) -> Result<Self, BuildError> {
        RetryPolicyBuilder::from_config(cfg)?.build()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Execute an async operation with retry semantics.
    ///
    /// `name` labels the operation in events and logs.
    pub async fn execute<T, E, Fut, Op>(
        &self,
        name: &str,
        mut operation: Op,
    ) -> Result<T, RetryExhausted<E>>
    where
        E: fmt::Display,
        Fut: Future<Output = Result<T, E>>,
        Op: FnMut() -> Fut,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(operation = name, attempt, "executing");
            match operation().await {
                Ok(value) => {
                    self.sink.emit(RelayEvent::Retry(RetryEvent::Succeeded {
                        operation: name.to_owned(),
                        attempts: attempt,
                    }));
                    return Ok(value);
                }
                Err(e) => {
                    let exhausted = attempt >= self.max_attempts;
                    let next_delay = (!exhausted).then(|| self.backoff.delay(attempt));
                    self.sink.emit(RelayEvent::Retry(RetryEvent::AttemptFailed {
                        operation: name.to_owned(),
                        attempt,
                        error: e.to_string(),
                        next_delay,
                    }));

                    match next_delay {
                        Some(delay) => self.sleeper.sleep(delay).await,
                        None => {
                            self.sink.emit(RelayEvent::Retry(RetryEvent::Exhausted {
                                operation: name.to_owned(),
                                attempts: attempt,
                                last_error: e.to_string(),
                            }));
                            return Err(RetryExhausted::new(attempt, e));
                        }
                    }
                }
            }
        }
    }
}

/// Builder for `RetryPolicy`.
pub struct RetryPolicyBuilder {
    max_attempts: usize,
    backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn EventSink>,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    /// `max_attempts` must be > 0.
    InvalidMaxAttempts(usize),
    /// The configured interval shape is invalid.
    Backoff(BackoffError),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::InvalidMaxAttempts(n) => {
                write!(f, "max_attempts must be > 0 (got {})", n)
            }
            BuildError::Backoff(e) => write!(f, "invalid backoff: {}", e),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<BackoffError> for BuildError {
    fn from(e: BackoffError) -> Self {
        BuildError::Backoff(e)
    }
}

impl RetryPolicyBuilder {
    /// Create a builder with sane defaults.
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::exponential(Duration::from_secs(1)),
            sleeper: Arc::new(TokioSleeper),
            sink: Arc::new(NullSink),
        }
    }

    /// Builder seeded with the attempt budget and interval shape from `cfg`.
    pub fn from_config(cfg: &RetryConfig) -> Result<Self, BuildError> {
        Ok(Self::new()
            .max_attempts(cfg.max_attempts as usize)
            .backoff(Backoff::from_retry_config(cfg)?))
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set backoff strategy.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Share an existing sleeper.
    pub fn with_shared_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Report attempts to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            sleeper: self.sleeper,
            sink: self.sink,
        })
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
