//! Topic creation and visibility checks.
//!
//! The broker is reached through the [`BrokerAdmin`] capability so the control flow here can
//! be exercised against fakes; `postrelay-kafka` provides the real client.

use crate::config::TopicSpec;
use crate::error::{AdminError, BrokerError};
use crate::poll::{PollError, PollStatus, Poller};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Result of one topic-listing query. Never stored beyond the poll that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicListingSnapshot {
    observed_at: DateTime<Utc>,
    names: BTreeSet<String>,
}

impl TopicListingSnapshot {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { observed_at: Utc::now(), names: names.into_iter().map(Into::into).collect() }
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Broker administration RPCs used by the relay.
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    /// Ask the broker to create every topic in `specs` with a single request.
    ///
    /// Per-topic rejections (an existing topic, for instance) are the implementation's to
    /// report; an `Err` means the request as a whole failed and may be retried.
    async fn create_topics(&self, specs: &[TopicSpec]) -> Result<(), BrokerError>;

    /// Current topic listing, or `None` when the broker answered without listing information.
    async fn list_topics(&self) -> Result<Option<TopicListingSnapshot>, BrokerError>;
}

#[async_trait]
impl<A: BrokerAdmin + ?Sized> BrokerAdmin for std::sync::Arc<A> {
    async fn create_topics(&self, specs: &[TopicSpec]) -> Result<(), BrokerError> {
        (**self).create_topics(specs).await
    }

    async fn list_topics(&self) -> Result<Option<TopicListingSnapshot>, BrokerError> {
        (**self).list_topics().await
    }
}

/// Creates the relay's topics and waits for them to show up in cluster metadata.
#[derive(Debug)]
pub struct TopicAdmin<A> {
    admin: A,
    retry: RetryPolicy,
    poller: Poller,
}

impl<A: BrokerAdmin> TopicAdmin<A> {
    pub fn new(admin: A, retry: RetryPolicy, poller: Poller) -> Self {
        Self { admin, retry, poller }
    }

    pub fn admin(&self) -> &A {
        &self.admin
    }

    /// Request creation of all `specs` at once, retrying the request on failure.
    pub async fn create_topics(&self, specs: &[TopicSpec]) -> Result<(), AdminError> {
        let names: Vec<&str> = specs.iter().map(TopicSpec::name).collect();
        tracing::info!(topics = ?names, "creating kafka topics");
        self.retry
            .execute("create_topics", || self.admin.create_topics(specs))
            .await
            .map_err(|e| {
                tracing::error!(
                    attempts = e.attempts,
                    "reached max number of retry attempts to create kafka topics"
                );
                AdminError::CreateTopics(e)
            })
    }

    /// One topic listing, retrying the query on failure.
    pub async fn list_topics(&self) -> Result<Option<TopicListingSnapshot>, AdminError> {
        let listing = self
            .retry
            .execute("list_topics", || self.admin.list_topics())
            .await
            .map_err(|e| {
                tracing::error!(
                    attempts = e.attempts,
                    "reached max number of retry attempts to get topic listings"
                );
                AdminError::ListTopics(e)
            })?;
        if let Some(snapshot) = &listing {
            for name in snapshot.names() {
                tracing::debug!(topic = %name, "topic found in kafka cluster");
            }
        }
        Ok(listing)
    }

    /// Poll the listing until every name in `names` appears, in order.
    ///
    /// Each topic gets its own attempt budget and schedule. A listing without information
    /// (`None`) is not taken as proof of absence but still uses up a poll.
    pub async fn wait_until_topics_visible(&self, names: &[String]) -> Result<(), AdminError> {
        for name in names {
            let check = format!("topic {} visible", name);
            let polls = self
                .poller
                .poll_until(&check, || async {
                    let status = match self.list_topics().await? {
                        Some(snapshot) if snapshot.contains(name) => PollStatus::Ready,
                        Some(_) => PollStatus::Pending,
                        None => PollStatus::Unknown,
                    };
                    Ok::<_, AdminError>(status)
                })
                .await
                .map_err(|e| match e {
                    PollError::Probe(admin) => admin,
                    PollError::TimedOut(timeout) => {
                        tracing::error!(
                            topic = %name,
                            attempts = timeout.attempts,
                            "reached max number of retry attempts to verify kafka topics are created"
                        );
                        AdminError::NotVisible(timeout)
                    }
                })?;
            tracing::debug!(topic = %name, polls, "topic visible");
        }
        Ok(())
    }
}
