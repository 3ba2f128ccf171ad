//! Stream glue: raw posts in, published records out.
//!
//! A [`StreamSource`] pushes [`RawPost`]s into a [`PostListener`]. The relay's listener,
//! [`RelayListener`], maps each post to a [`PostRecord`] and hands it to the
//! [`EventPublisher`]. Sources are only started through [`StreamRunner::start`], which
//! demands the [`Ready`] proof produced by the readiness gate.

pub mod jsonl;
pub mod mock;

pub use jsonl::JsonLinesSource;
pub use mock::MockStreamSource;

use crate::orchestrator::Ready;
use crate::publisher::EventPublisher;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A post as delivered by the stream source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPost {
    pub id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// The record published for every post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: i64,
    pub user_id: i64,
    pub text: String,
    /// Epoch millis.
    pub created_at: i64,
}

impl From<&RawPost> for PostRecord {
    fn from(post: &RawPost) -> Self {
        Self {
            id: post.id,
            user_id: post.user_id,
            text: post.text.clone(),
            created_at: post.created_at.timestamp_millis(),
        }
    }
}

/// Callback invoked by a stream source for every post.
pub trait PostListener: Send + Sync {
    fn on_post(&self, post: RawPost);
}

/// Publishes every received post to one topic, keyed by user id.
#[derive(Debug, Clone)]
pub struct RelayListener {
    publisher: Arc<EventPublisher>,
    topic: String,
}

impl RelayListener {
    pub fn new(publisher: Arc<EventPublisher>, topic: impl Into<String>) -> Self {
        Self { publisher, topic: topic.into() }
    }
}

impl PostListener for RelayListener {
    fn on_post(&self, post: RawPost) {
        tracing::info!(text = %post.text, topic = %self.topic, "received post, sending to kafka");
        let record = PostRecord::from(&post);
        if let Err(err) = self.publisher.send(&self.topic, &record.user_id, &record) {
            tracing::error!(error = %err, post_id = post.id, "dropping post");
        }
    }
}

/// Errors ending a stream source.
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("stream source i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stream task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A push source of raw posts.
#[async_trait]
pub trait StreamSource: Send {
    /// Feed posts to `listener` until the source ends or `cancel` fires.
    async fn run(
        self: Box<Self>,
        listener: Arc<dyn PostListener>,
        cancel: CancellationToken,
    ) -> Result<(), StreamError>;
}

/// Starts stream sources once readiness has been established.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamRunner;

impl StreamRunner {
    /// Spawn `source` on the current runtime.
    ///
    /// Requires a [`Ready`] proof, so a stream can only start after the readiness gate
    /// passed.
    pub fn start(
        source: Box<dyn StreamSource>,
        listener: Arc<dyn PostListener>,
        ready: &Ready,
    ) -> StreamHandle {
        tracing::info!(topics = ?ready.topics(), "starting stream");
        let cancel = CancellationToken::new();
        let task = tokio::spawn(source.run(listener, cancel.child_token()));
        StreamHandle { cancel, task }
    }
}

/// Owned handle to a running stream source.
#[derive(Debug)]
pub struct StreamHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), StreamError>>,
}

impl StreamHandle {
    /// Whether the source already stopped on its own.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the source to stop and wait for it.
    pub async fn shutdown(self) -> Result<(), StreamError> {
        tracing::info!("shutting down stream");
        self.cancel.cancel();
        self.task.await?
    }

    /// Run until the source ends or `signal` resolves, whichever comes first.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), StreamError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            finished = &mut self.task => {
                tracing::info!("stream source finished");
                return finished?;
            }
            _ = signal => {}
        }
        self.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProduceError, PublishError};
    use crate::orchestrator::ready_for_tests;
    use crate::publisher::{DeliveryFuture, DeliveryReceipt, OutboundRecord, ProduceClient};
    use crate::telemetry::MemorySink;
    use chrono::TimeZone;
    use futures::FutureExt;
    use std::sync::Mutex;
    use std::time::Duration;

    fn post() -> RawPost {
        RawPost {
            id: 7,
            user_id: 42,
            text: "hello relay".into(),
            created_at: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
        }
    }

    #[test]
    fn transform_keeps_fields_and_uses_epoch_millis() {
        let record = PostRecord::from(&post());
        assert_eq!(
            record,
            PostRecord { id: 7, user_id: 42, text: "hello relay".into(), created_at: 1_700_000_000_123 }
        );
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<OutboundRecord>>);

    impl ProduceClient for Recording {
        fn enqueue(&self, record: OutboundRecord) -> Result<DeliveryFuture, ProduceError> {
            self.0.lock().unwrap().push(record);
            Ok(async { Ok(DeliveryReceipt { partition: 0, offset: 0, timestamp: None }) }.boxed())
        }

        fn flush(&self, _: Duration) -> Result<(), ProduceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn relay_listener_publishes_keyed_by_user() {
        let client = Arc::new(Recording::default());
        let publisher = Arc::new(
            EventPublisher::new(client.clone(), Arc::new(MemorySink::new()), Duration::from_secs(1))
                .unwrap(),
        );
        RelayListener::new(publisher, "posts").on_post(post());

        let records = client.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].topic, "posts");
        assert_eq!(records[0].key, 42i64.to_be_bytes().to_vec());
        let decoded: PostRecord = serde_json::from_slice(&records[0].payload).unwrap();
        assert_eq!(decoded.id, 7);
    }

    #[tokio::test]
    async fn relay_listener_survives_closed_publisher() {
        let publisher = Arc::new(
            EventPublisher::new(
                Arc::new(Recording::default()),
                Arc::new(MemorySink::new()),
                Duration::from_secs(1),
            )
            .unwrap(),
        );
        publisher.close().await.unwrap();
        RelayListener::new(publisher.clone(), "posts").on_post(post());
        assert!(matches!(
            publisher.send("posts", &1i64, &1),
            Err(PublishError::PublisherClosed { .. })
        ));
    }

    /// Emits one post, then waits for cancellation.
    struct OneThenWait;

    #[async_trait]
    impl StreamSource for OneThenWait {
        async fn run(
            self: Box<Self>,
            listener: Arc<dyn PostListener>,
            cancel: CancellationToken,
        ) -> Result<(), StreamError> {
            listener.on_post(post());
            cancel.cancelled().await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<RawPost>>);

    impl PostListener for Collect {
        fn on_post(&self, post: RawPost) {
            self.0.lock().unwrap().push(post);
        }
    }

    #[tokio::test]
    async fn run_until_signal_cancels_source() {
        let listener = Arc::new(Collect::default());
        let handle =
            StreamRunner::start(Box::new(OneThenWait), listener.clone(), &ready_for_tests(&["posts"]));
        handle.run_until(tokio::time::sleep(Duration::from_millis(20))).await.unwrap();
        assert_eq!(listener.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_source() {
        let handle = StreamRunner::start(
            Box::new(OneThenWait),
            Arc::new(Collect::default()),
            &ready_for_tests(&["posts"]),
        );
        assert!(!handle.is_finished());
        handle.shutdown().await.unwrap();
    }
}
