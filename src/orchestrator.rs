//! Startup readiness gate.
//!
//! [`ReadinessOrchestrator::run`] sequences topic creation, optional topic-visibility
//! polling and the registry health check. Each step must succeed before the next starts;
//! the first failure aborts with no partial readiness. Success yields a [`Ready`] proof,
//! which is the only way to start a stream (see [`StreamRunner`](crate::stream::StreamRunner)).

use crate::admin::{BrokerAdmin, TopicAdmin};
use crate::config::TopicSpec;
use crate::error::ReadinessError;
use crate::registry::{HealthProbe, RegistryHealthChecker};
use crate::telemetry::{EventSink, NullSink, ReadinessEvent, RelayEvent};
use std::sync::Arc;

/// Proof that readiness passed. Only [`ReadinessOrchestrator::run`] constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready {
    topics: Vec<String>,
}

impl Ready {
    /// Topics that were created (and, if configured, seen in the listing).
    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}

/// Progress of one readiness run. Dropped once both gates passed.
#[derive(Debug, Default)]
struct ReadinessState {
    topics_ready: bool,
    registry_ready: bool,
}

impl ReadinessState {
    fn is_ready(&self) -> bool {
        self.topics_ready && self.registry_ready
    }
}

/// Owns the topic admin and registry checker for the startup barrier.
#[derive(Debug)]
pub struct ReadinessOrchestrator<A, P> {
    topic_admin: TopicAdmin<A>,
    registry: RegistryHealthChecker<P>,
    specs: Vec<TopicSpec>,
    registry_url: String,
    verify_topic_visibility: bool,
    sink: Arc<dyn EventSink>,
}

impl<A: BrokerAdmin, P: HealthProbe> ReadinessOrchestrator<A, P> {
    pub fn new(
        topic_admin: TopicAdmin<A>,
        registry: RegistryHealthChecker<P>,
        specs: Vec<TopicSpec>,
        registry_url: impl Into<String>,
    ) -> Self {
        Self {
            topic_admin,
            registry,
            specs,
            registry_url: registry_url.into(),
            verify_topic_visibility: true,
            sink: Arc::new(NullSink),
        }
    }

    /// Whether to poll the topic listing after creation. Defaults to `true`.
    pub fn verify_topic_visibility(mut self, enabled: bool) -> Self {
        self.verify_topic_visibility = enabled;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run the readiness sequence once.
    pub async fn run(&self) -> Result<Ready, ReadinessError> {
        let mut state = ReadinessState::default();
        let names: Vec<String> = self.specs.iter().map(|s| s.name().to_owned()).collect();

        self.topic_admin.create_topics(&self.specs).await?;
        self.emit(ReadinessEvent::TopicsCreated { topics: names.clone() });

        if self.verify_topic_visibility {
            self.topic_admin.wait_until_topics_visible(&names).await?;
            self.emit(ReadinessEvent::TopicsVisible { topics: names.clone() });
        } else {
            tracing::debug!("skipping topic visibility check");
        }
        state.topics_ready = true;

        self.registry.wait_until_healthy(&self.registry_url).await?;
        self.emit(ReadinessEvent::RegistryHealthy { url: self.registry_url.clone() });
        state.registry_ready = true;

        debug_assert!(state.is_ready());
        tracing::info!(topics = ?names, "topics are ready for operations");
        self.emit(ReadinessEvent::Ready);
        Ok(Ready { topics: names })
    }

    fn emit(&self, event: ReadinessEvent) {
        self.sink.emit(RelayEvent::Readiness(event));
    }
}

#[cfg(test)]
pub(crate) fn ready_for_tests(topics: &[&str]) -> Ready {
    Ready { topics: topics.iter().map(|t| t.to_string()).collect() }
}
