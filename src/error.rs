//! Error taxonomy for readiness checks and publishing.
//!
//! Readiness-path errors (`AdminError`, `HealthError`, `ReadinessError`) are fatal to startup.
//! Publish-path errors never abort the process: delivery failures travel through the
//! completion observer as `PublishOutcome::Failure`, and only contract violations such as
//! sending after close come back from `EventPublisher::send` as `PublishError`.
use std::fmt;

/// A broker RPC failed in a way that may succeed when retried.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("broker {operation} failed: {message}")]
pub struct BrokerError {
    /// Logical operation that failed (`create_topics`, `list_topics`, ...).
    pub operation: &'static str,
    pub message: String,
}

impl BrokerError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self { operation, message: message.into() }
    }
}

/// All attempts of a `RetryPolicy` failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    /// Total attempts made, equal to the configured `max_attempts`.
    pub attempts: usize,
    /// Cause of the final failed attempt.
    pub last: E,
}

impl<E> RetryExhausted<E> {
    pub fn new(attempts: usize, last: E) -> Self {
        Self { attempts, last }
    }

    /// Consume the error, keeping only the last underlying cause.
    pub fn into_last(self) -> E {
        self.last
    }
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "retry exhausted after {} attempts; last error: {}", self.attempts, self.last)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last)
    }
}

/// A polling loop never observed its condition within the attempt budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessTimeout {
    /// What was being waited for, e.g. `topic posts-avro visible`.
    pub check: String,
    pub attempts: usize,
}

impl fmt::Display for ReadinessTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "readiness timeout: {} not observed after {} attempts",
            self.check, self.attempts
        )
    }
}

impl std::error::Error for ReadinessTimeout {}

/// Errors from `TopicAdmin`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    /// The create-topics request kept failing.
    #[error("could not create topics: {0}")]
    CreateTopics(#[source] RetryExhausted<BrokerError>),
    /// The topic listing query kept failing.
    #[error("could not list topics: {0}")]
    ListTopics(#[source] RetryExhausted<BrokerError>),
    /// A topic never showed up in the listing.
    #[error(transparent)]
    NotVisible(#[from] ReadinessTimeout),
}

impl AdminError {
    /// Check if this error is due to an exhausted polling budget.
    pub fn is_readiness_timeout(&self) -> bool {
        matches!(self, Self::NotVisible(_))
    }

    /// Check if this error is due to an exhausted retry budget.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::CreateTopics(_) | Self::ListTopics(_))
    }
}

/// Errors from `RegistryHealthChecker`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("schema registry not healthy: {0}")]
    Unhealthy(#[from] ReadinessTimeout),
}

/// Errors aborting startup readiness.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("topic readiness failed: {0}")]
    Topics(#[from] AdminError),
    #[error("registry readiness failed: {0}")]
    Registry(#[from] HealthError),
}

impl ReadinessError {
    /// Check if any polling loop ran out of attempts.
    pub fn is_readiness_timeout(&self) -> bool {
        match self {
            Self::Topics(e) => e.is_readiness_timeout(),
            Self::Registry(HealthError::Unhealthy(_)) => true,
        }
    }

    /// Access the timeout details, if a polling loop ran out of attempts.
    pub fn readiness_timeout(&self) -> Option<&ReadinessTimeout> {
        match self {
            Self::Topics(AdminError::NotVisible(t)) => Some(t),
            Self::Registry(HealthError::Unhealthy(t)) => Some(t),
            _ => None,
        }
    }
}

/// A single record could not be delivered by the broker client.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProduceError {
    pub message: String,
}

impl ProduceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Errors returned synchronously by `EventPublisher`.
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    /// `send` was called after `close`.
    #[error("publisher closed: cannot send to topic {topic}")]
    PublisherClosed { topic: String },
    /// The value could not be serialized before hand-off.
    #[error("failed to encode record for topic {topic}: {source}")]
    Encode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
    /// The publisher was constructed outside a tokio runtime.
    #[error("publisher requires a tokio runtime")]
    NoRuntime,
    /// Flushing the client during close failed.
    #[error("flush on close failed: {0}")]
    Flush(#[source] ProduceError),
}

impl PublishError {
    /// Check if this error is the send-after-close contract violation.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::PublisherClosed { .. })
    }
}
