//! Poll a query until its result converges.
//!
//! Unlike [`RetryPolicy`](crate::RetryPolicy), which retries an operation that *failed*, a
//! [`Poller`] repeats a query that *succeeded* but whose answer is not the one we are waiting
//! for yet. Errors returned by the probe abort the loop immediately; callers that want
//! transient query failures smoothed over wrap the query itself in a retry policy.
//!
//! Each call to [`Poller::poll_until`] gets a fresh attempt counter and a fresh schedule.
//! The interval before poll `k + 1` is `schedule.delay(k)`, which for
//! [`Backoff::poll_schedule`] is `sleep_time_ms * multiplier^(k-1)` with no cap; only the
//! attempt budget bounds the loop.

use crate::backoff::Backoff;
use crate::config::RetryConfig;
use crate::error::ReadinessTimeout;
use crate::retry::BuildError;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::telemetry::{EventSink, NullSink, PollEvent, RelayEvent};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// What a single poll observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// The condition holds.
    Ready,
    /// The query answered and the condition does not hold yet.
    Pending,
    /// The query answered without information about the condition.
    Unknown,
}

/// Why a poll loop stopped without reaching its condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<E> {
    /// The probe itself failed.
    Probe(E),
    /// The attempt budget ran out.
    TimedOut(ReadinessTimeout),
}

impl<E: fmt::Display> fmt::Display for PollError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::Probe(e) => write!(f, "probe failed: {}", e),
            PollError::TimedOut(t) => write!(f, "{}", t),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for PollError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollError::Probe(e) => Some(e),
            PollError::TimedOut(t) => Some(t),
        }
    }
}

/// Bounded-attempt, growing-interval poll loop.
#[derive(Clone)]
pub struct Poller {
    max_attempts: usize,
    schedule: Backoff,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("max_attempts", &self.max_attempts)
            .field("schedule", &self.schedule)
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl Poller {
    /// Poller with an explicit budget and schedule, sleeping on the tokio timer.
    pub fn new(max_attempts: usize, schedule: Backoff) -> Result<Self, BuildError> {
        if max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(Self { max_attempts, schedule, sleeper: Arc::new(TokioSleeper), sink: Arc::new(NullSink) })
    }

    /// Budget `max_attempts`, schedule seeded by `sleep_time_ms` growing by `multiplier`.
    pub fn from_config(cfg: &RetryConfig) -> Result<Self, BuildError> {
        Self::new(cfg.max_attempts as usize, Backoff::poll_schedule(cfg)?)
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Run `probe` until it reports [`PollStatus::Ready`], returning the number of polls made.
    ///
    /// `check` describes the awaited condition and ends up in events and in
    /// [`ReadinessTimeout::check`].
    pub async fn poll_until<E, Fut, Probe>(
        &self,
        check: &str,
        mut probe: Probe,
    ) -> Result<usize, PollError<E>>
    where
        Fut: Future<Output = Result<PollStatus, E>>,
        Probe: FnMut() -> Fut,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let status = probe().await.map_err(PollError::Probe)?;
            if status == PollStatus::Ready {
                self.sink.emit(RelayEvent::Poll(PollEvent::Ready {
                    check: check.to_owned(),
                    attempts: attempt,
                }));
                return Ok(attempt);
            }

            let next_delay = (attempt < self.max_attempts).then(|| self.schedule.delay(attempt));
            let event = match status {
                PollStatus::Unknown => {
                    PollEvent::Unknown { check: check.to_owned(), attempt, next_delay }
                }
                _ => PollEvent::Pending { check: check.to_owned(), attempt, next_delay },
            };
            self.sink.emit(RelayEvent::Poll(event));

            match next_delay {
                Some(delay) => {
                    tracing::info!(
                        check,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "sleeping before next readiness poll"
                    );
                    self.sleeper.sleep(delay).await;
                }
                None => {
                    self.sink.emit(RelayEvent::Poll(PollEvent::TimedOut {
                        check: check.to_owned(),
                        attempts: attempt,
                    }));
                    return Err(PollError::TimedOut(ReadinessTimeout {
                        check: check.to_owned(),
                        attempts: attempt,
                    }));
                }
            }
        }
    }
}
