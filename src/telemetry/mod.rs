//! Observability for the relay.
//!
//! Every retrying, polling and publishing component reports what it does as a [`RelayEvent`]
//! through an [`EventSink`]. The sink doubles as the completion observer for asynchronous
//! sends: delivery outcomes arrive as `RelayEvent::Publish`.
//!
//! # Event Types
//!
//! - **Retry**: `AttemptFailed`, `Succeeded`, `Exhausted`
//! - **Poll**: `Pending`, `Unknown`, `Ready`, `TimedOut`
//! - **Publish**: `Success`, `Failure`
//! - **Readiness**: `TopicsCreated`, `TopicsVisible`, `RegistryHealthy`, `Ready`

pub mod events;
pub mod sinks;

pub use events::{PollEvent, PublishOutcome, ReadinessEvent, RelayEvent, RetryEvent};
pub use sinks::{EventSink, LogSink, MemorySink, MulticastSink, NullSink};
