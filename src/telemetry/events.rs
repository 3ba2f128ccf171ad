use serde_json::json;
use std::fmt;
use std::time::Duration;

/// Events emitted by the relay's retry, polling, readiness and publish paths.
///
/// Events are observational only: nothing in the relay reads them back, and dropping them
/// (see `NullSink`) never changes control flow.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Retry policy events
    Retry(RetryEvent),
    /// Poll-until-ready events
    Poll(PollEvent),
    /// Delivery outcome of a single published record
    Publish(PublishOutcome),
    /// Startup gate progress
    Readiness(ReadinessEvent),
}

/// Events emitted by `RetryPolicy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    /// An attempt failed; `next_delay` is `None` when no attempts remain.
    AttemptFailed {
        operation: String,
        /// The attempt number (1-indexed)
        attempt: usize,
        error: String,
        next_delay: Option<Duration>,
    },
    /// The operation succeeded after `attempts` tries.
    Succeeded { operation: String, attempts: usize },
    /// Every attempt failed.
    Exhausted { operation: String, attempts: usize, last_error: String },
}

/// Events emitted by `Poller`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// The probe answered and the condition does not hold yet.
    Pending { check: String, attempt: usize, next_delay: Option<Duration> },
    /// The probe answered without information about the condition.
    Unknown { check: String, attempt: usize, next_delay: Option<Duration> },
    /// The condition holds.
    Ready { check: String, attempts: usize },
    /// The attempt budget ran out.
    TimedOut { check: String, attempts: usize },
}

/// Outcome of one publish attempt, reported by the completion observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Success {
        topic: String,
        partition: i32,
        offset: i64,
        /// Broker or create time in epoch millis, when the client reports one.
        timestamp: Option<i64>,
    },
    Failure {
        topic: String,
        /// Description of the value that failed to go out.
        value: String,
        cause: String,
    },
}

impl PublishOutcome {
    pub fn topic(&self) -> &str {
        match self {
            Self::Success { topic, .. } | Self::Failure { topic, .. } => topic,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Startup gate progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessEvent {
    TopicsCreated { topics: Vec<String> },
    TopicsVisible { topics: Vec<String> },
    RegistryHealthy { url: String },
    /// Both gates passed; the stream may start.
    Ready,
}

impl fmt::Display for RelayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayEvent::Retry(event) => write!(f, "Retry::{}", event),
            RelayEvent::Poll(event) => write!(f, "Poll::{}", event),
            RelayEvent::Publish(event) => write!(f, "Publish::{}", event),
            RelayEvent::Readiness(event) => write!(f, "Readiness::{}", event),
        }
    }
}

impl fmt::Display for RetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryEvent::AttemptFailed { operation, attempt, error, next_delay } => {
                write!(f, "AttemptFailed({}, #{}, error={}", operation, attempt, error)?;
                match next_delay {
                    Some(d) => write!(f, ", next_delay={:?})", d),
                    None => write!(f, ")"),
                }
            }
            RetryEvent::Succeeded { operation, attempts } => {
                write!(f, "Succeeded({}, attempts={})", operation, attempts)
            }
            RetryEvent::Exhausted { operation, attempts, last_error } => {
                write!(f, "Exhausted({}, attempts={}, last_error={})", operation, attempts, last_error)
            }
        }
    }
}

impl fmt::Display for PollEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollEvent::Pending { check, attempt, next_delay } => {
                write!(f, "Pending({}, #{}, next_delay={:?})", check, attempt, next_delay)
            }
            PollEvent::Unknown { check, attempt, next_delay } => {
                write!(f, "Unknown({}, #{}, next_delay={:?})", check, attempt, next_delay)
            }
            PollEvent::Ready { check, attempts } => {
                write!(f, "Ready({}, attempts={})", check, attempts)
            }
            PollEvent::TimedOut { check, attempts } => {
                write!(f, "TimedOut({}, attempts={})", check, attempts)
            }
        }
    }
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishOutcome::Success { topic, partition, offset, timestamp } => write!(
                f,
                "Success(topic={}, partition={}, offset={}, timestamp={:?})",
                topic, partition, offset, timestamp
            ),
            PublishOutcome::Failure { topic, value, cause } => {
                write!(f, "Failure(topic={}, value={}, cause={})", topic, value, cause)
            }
        }
    }
}

impl fmt::Display for ReadinessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessEvent::TopicsCreated { topics } => write!(f, "TopicsCreated({:?})", topics),
            ReadinessEvent::TopicsVisible { topics } => write!(f, "TopicsVisible({:?})", topics),
            ReadinessEvent::RegistryHealthy { url } => write!(f, "RegistryHealthy({})", url),
            ReadinessEvent::Ready => write!(f, "Ready"),
        }
    }
}

#[inline]
fn clamp_u64(val: u128) -> u64 {
    val.min(u128::from(u64::MAX)) as u64
}

fn delay_ms(delay: &Option<Duration>) -> serde_json::Value {
    match delay {
        Some(d) => json!(clamp_u64(d.as_millis())),
        None => serde_json::Value::Null,
    }
}

impl RelayEvent {
    /// Render the event as a flat JSON object with a `kind` discriminator.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RelayEvent::Retry(r) => match r {
                RetryEvent::AttemptFailed { operation, attempt, error, next_delay } => json!({
                    "kind": "retry_attempt_failed",
                    "operation": operation,
                    "attempt": *attempt,
                    "error": error,
                    "next_delay_ms": delay_ms(next_delay),
                }),
                RetryEvent::Succeeded { operation, attempts } => json!({
                    "kind": "retry_succeeded",
                    "operation": operation,
                    "attempts": *attempts,
                }),
                RetryEvent::Exhausted { operation, attempts, last_error } => json!({
                    "kind": "retry_exhausted",
                    "operation": operation,
                    "attempts": *attempts,
                    "last_error": last_error,
                }),
            },
            RelayEvent::Poll(p) => match p {
                PollEvent::Pending { check, attempt, next_delay } => json!({
                    "kind": "poll_pending",
                    "check": check,
                    "attempt": *attempt,
                    "next_delay_ms": delay_ms(next_delay),
                }),
                PollEvent::Unknown { check, attempt, next_delay } => json!({
                    "kind": "poll_unknown",
                    "check": check,
                    "attempt": *attempt,
                    "next_delay_ms": delay_ms(next_delay),
                }),
                PollEvent::Ready { check, attempts } => {
                    json!({ "kind": "poll_ready", "check": check, "attempts": *attempts })
                }
                PollEvent::TimedOut { check, attempts } => {
                    json!({ "kind": "poll_timed_out", "check": check, "attempts": *attempts })
                }
            },
            RelayEvent::Publish(o) => match o {
                PublishOutcome::Success { topic, partition, offset, timestamp } => json!({
                    "kind": "publish_success",
                    "topic": topic,
                    "partition": *partition,
                    "offset": *offset,
                    "timestamp": timestamp,
                }),
                PublishOutcome::Failure { topic, value, cause } => json!({
                    "kind": "publish_failure",
                    "topic": topic,
                    "value": value,
                    "cause": cause,
                }),
            },
            RelayEvent::Readiness(r) => match r {
                ReadinessEvent::TopicsCreated { topics } => {
                    json!({ "kind": "topics_created", "topics": topics })
                }
                ReadinessEvent::TopicsVisible { topics } => {
                    json!({ "kind": "topics_visible", "topics": topics })
                }
                ReadinessEvent::RegistryHealthy { url } => {
                    json!({ "kind": "registry_healthy", "url": url })
                }
                ReadinessEvent::Ready => json!({ "kind": "ready" }),
            },
        }
    }
}
