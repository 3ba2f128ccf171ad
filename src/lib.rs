#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # postrelay
//!
//! Broker readiness and retry orchestration for a post-to-Kafka relay.
//!
//! ## Features
//!
//! - **Bounded retry** of failing broker RPCs with capped exponential backoff
//! - **Poll-until-converged** loops for topic visibility and registry health
//! - **Readiness gate** producing a [`Ready`] proof that a stream needs to start
//! - **Fire-and-forget publishing** with delivery outcomes reported to an [`EventSink`]
//!
//! The broker, the registry and the produce path sit behind traits ([`BrokerAdmin`],
//! [`HealthProbe`], [`ProduceClient`]); `postrelay-kafka` implements them on `rdkafka`.
//!
//! ## Quick Start
//!
//! ```rust
//! use postrelay::{Backoff, Poller, PollStatus, TrackingSleeper};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let sleeper = TrackingSleeper::new();
//! let poller = Poller::new(3, Backoff::exponential(Duration::from_millis(100)))
//!     .unwrap()
//!     .with_sleeper(Arc::new(sleeper.clone()));
//!
//! let mut polls = 0;
//! let attempts = poller
//!     .poll_until("third poll", || {
//!         polls += 1;
//!         let status = if polls == 3 { PollStatus::Ready } else { PollStatus::Pending };
//!         async move { Ok::<_, std::convert::Infallible>(status) }
//!     })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(attempts, 3);
//! assert_eq!(sleeper.calls(), vec![Duration::from_millis(100), Duration::from_millis(200)]);
//! # });
//! ```

pub mod admin;
pub mod backoff;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod poll;
pub mod prelude;
pub mod publisher;
pub mod registry;
pub mod retry;
pub mod sleeper;
pub mod stream;
pub mod telemetry;

// Re-exports
pub use admin::{BrokerAdmin, TopicAdmin, TopicListingSnapshot};
pub use backoff::{Backoff, BackoffError};
pub use config::{RelayConfig, RetryConfig, TopicSpec};
pub use error::{
    AdminError, BrokerError, HealthError, ProduceError, PublishError, ReadinessError,
    ReadinessTimeout, RetryExhausted,
};
pub use orchestrator::{ReadinessOrchestrator, Ready};
pub use poll::{PollError, PollStatus, Poller};
pub use publisher::{DeliveryReceipt, EventPublisher, OutboundRecord, ProduceClient};
#[cfg(feature = "http")]
pub use registry::HttpHealthProbe;
pub use registry::{HealthProbe, ProbeError, RegistryHealthChecker};
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use stream::{PostListener, RawPost, RelayListener, StreamHandle, StreamRunner, StreamSource};
pub use telemetry::{EventSink, LogSink, MemorySink, NullSink, RelayEvent};
