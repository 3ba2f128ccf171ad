//! Convenient re-exports for wiring a relay.
pub use crate::{
    admin::{BrokerAdmin, TopicAdmin},
    backoff::{Backoff, MAX_BACKOFF},
    config::{RelayConfig, RetryConfig, TopicSpec},
    error::{PublishError, ReadinessError, ReadinessTimeout, RetryExhausted},
    orchestrator::{ReadinessOrchestrator, Ready},
    poll::{PollStatus, Poller},
    publisher::{EventPublisher, ProduceClient},
    registry::{HealthProbe, RegistryHealthChecker},
    retry::RetryPolicy,
    stream::{JsonLinesSource, MockStreamSource, RelayListener, StreamRunner},
    telemetry::{EventSink, LogSink, RelayEvent},
};
