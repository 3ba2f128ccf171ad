//! Fire-and-forget publishing with an asynchronous completion observer.
//!
//! [`EventPublisher::send`] encodes the value, hands the record to a [`ProduceClient`] and
//! returns without waiting for the broker. The delivery future is driven on the runtime the
//! publisher was built in, and its outcome reaches the [`EventSink`] as a
//! `RelayEvent::Publish`. Failed sends are reported, never re-sent.

use crate::error::{ProduceError, PublishError};
use crate::telemetry::{EventSink, PublishOutcome, RelayEvent};
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinSet;

/// Where and when the broker stored a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub partition: i32,
    pub offset: i64,
    /// Broker or create timestamp in epoch millis, when the broker reports one.
    pub timestamp: Option<i64>,
}

/// Resolves once the broker acknowledged (or rejected) a record.
pub type DeliveryFuture = BoxFuture<'static, Result<DeliveryReceipt, ProduceError>>;

/// An encoded record ready for the broker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Broker produce RPC.
pub trait ProduceClient: Send + Sync {
    /// Queue `record` for delivery without blocking on the broker.
    ///
    /// An `Err` means the client refused the record outright (full queue, oversized message).
    fn enqueue(&self, record: OutboundRecord) -> Result<DeliveryFuture, ProduceError>;

    /// Block until queued records are delivered or `timeout` elapses.
    fn flush(&self, timeout: Duration) -> Result<(), ProduceError>;
}

/// Encoding of record keys on the wire.
pub trait RecordKey {
    fn to_key_bytes(&self) -> Vec<u8>;
}

impl RecordKey for i64 {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }
}

impl RecordKey for u64 {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }
}

impl RecordKey for str {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl RecordKey for String {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

struct Open {
    client: Arc<dyn ProduceClient>,
    deliveries: JoinSet<()>,
}

/// Asynchronous publisher owning the produce client until [`close`](Self::close).
pub struct EventPublisher {
    state: Mutex<Option<Open>>,
    runtime: Handle,
    sink: Arc<dyn EventSink>,
    close_timeout: Duration,
}

impl fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher")
            .field("closed", &self.is_closed())
            .field("close_timeout", &self.close_timeout)
            .finish()
    }
}

impl EventPublisher {
    /// Build a publisher bound to the current tokio runtime.
    ///
    /// `close_timeout` bounds both the client flush and the wait for outstanding delivery
    /// observers during [`close`](Self::close).
    pub fn new(
        client: Arc<dyn ProduceClient>,
        sink: Arc<dyn EventSink>,
        close_timeout: Duration,
    ) -> Result<Self, PublishError> {
        let runtime = Handle::try_current().map_err(|_| PublishError::NoRuntime)?;
        Ok(Self {
            state: Mutex::new(Some(Open { client, deliveries: JoinSet::new() })),
            runtime,
            sink,
            close_timeout,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    /// Deliveries whose outcome has not been observed yet.
    pub fn in_flight(&self) -> usize {
        self.lock().as_ref().map_or(0, |open| open.deliveries.len())
    }

    /// Encode `value` as JSON and hand it to the broker client for `topic`.
    ///
    /// Returns as soon as the record is queued. A refusal by the client is reported to the
    /// sink as a failure outcome and is not an error here; only sending after close, or a
    /// value that cannot be encoded, is.
    pub fn send<K, V>(&self, topic: &str, key: &K, value: &V) -> Result<(), PublishError>
    where
        K: RecordKey + ?Sized,
        V: Serialize + fmt::Debug,
    {
        let mut guard = self.lock();
        let Some(open) = guard.as_mut() else {
            tracing::error!(%topic, "send called on a closed publisher");
            return Err(PublishError::PublisherClosed { topic: topic.to_owned() });
        };
        // Reap finished observers so the set only tracks in-flight deliveries.
        while open.deliveries.try_join_next().is_some() {}

        let payload = serde_json::to_vec(value)
            .map_err(|source| PublishError::Encode { topic: topic.to_owned(), source })?;
        tracing::info!(%topic, record = ?value, "sending message");
        let record = OutboundRecord { topic: topic.to_owned(), key: key.to_key_bytes(), payload };

        match open.client.enqueue(record) {
            Ok(delivery) => {
                let sink = Arc::clone(&self.sink);
                let topic = topic.to_owned();
                let description = format!("{:?}", value);
                open.deliveries.spawn_on(
                    async move {
                        let outcome = match delivery.await {
                            Ok(receipt) => PublishOutcome::Success {
                                topic,
                                partition: receipt.partition,
                                offset: receipt.offset,
                                timestamp: receipt.timestamp,
                            },
                            Err(cause) => PublishOutcome::Failure {
                                topic,
                                value: description,
                                cause: cause.to_string(),
                            },
                        };
                        sink.emit(RelayEvent::Publish(outcome));
                    },
                    &self.runtime,
                );
            }
            Err(cause) => {
                self.sink.emit(RelayEvent::Publish(PublishOutcome::Failure {
                    topic: topic.to_owned(),
                    value: format!("{:?}", value),
                    cause: cause.to_string(),
                }));
            }
        }
        Ok(())
    }

    /// Flush the client and release it.
    ///
    /// Outstanding delivery observers get up to `close_timeout` to report; any still pending
    /// afterwards are aborted. Closing an already closed publisher is a no-op.
    pub async fn close(&self) -> Result<(), PublishError> {
        let taken = self.lock().take();
        let Some(Open { client, mut deliveries }) = taken else {
            tracing::debug!("publisher already closed");
            return Ok(());
        };
        tracing::info!("closing kafka producer");

        let timeout = self.close_timeout;
        let flushed = self
            .runtime
            .spawn_blocking(move || client.flush(timeout))
            .await
            .unwrap_or_else(|join| Err(ProduceError::new(format!("flush task failed: {join}"))));

        let drained = tokio::time::timeout(timeout, async {
            while deliveries.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                abandoned = deliveries.len(),
                "abandoning deliveries still pending after close timeout"
            );
            deliveries.abort_all();
        }

        flushed.map_err(|e| {
            tracing::error!(error = %e, "flush on close failed");
            PublishError::Flush(e)
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Open>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MemorySink;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingClient {
        records: Mutex<Vec<OutboundRecord>>,
        flushes: AtomicUsize,
    }

    impl ProduceClient for RecordingClient {
        fn enqueue(&self, record: OutboundRecord) -> Result<DeliveryFuture, ProduceError> {
            let offset = {
                let mut records = self.records.lock().unwrap();
                records.push(record);
                records.len() as i64 - 1
            };
            Ok(async move { Ok(DeliveryReceipt { partition: 0, offset, timestamp: Some(1) }) }
                .boxed())
        }

        fn flush(&self, _timeout: Duration) -> Result<(), ProduceError> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn publisher(client: Arc<dyn ProduceClient>, sink: &MemorySink) -> EventPublisher {
        EventPublisher::new(client, Arc::new(sink.clone()), Duration::from_millis(200)).unwrap()
    }

    #[test]
    fn requires_a_runtime() {
        let err = EventPublisher::new(
            Arc::new(RecordingClient::default()),
            Arc::new(MemorySink::new()),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, PublishError::NoRuntime));
    }

    #[tokio::test]
    async fn send_encodes_key_and_json_payload() {
        let client = Arc::new(RecordingClient::default());
        let sink = MemorySink::new();
        let p = publisher(client.clone(), &sink);

        p.send("posts", &42i64, &serde_json::json!({"text": "hi"})).unwrap();
        p.close().await.unwrap();

        let records = client.records.lock().unwrap();
        assert_eq!(records[0].topic, "posts");
        assert_eq!(records[0].key, 42i64.to_be_bytes().to_vec());
        assert_eq!(records[0].payload, br#"{"text":"hi"}"#.to_vec());

        let outcomes = sink.publish_outcomes();
        assert_eq!(
            outcomes,
            vec![PublishOutcome::Success {
                topic: "posts".into(),
                partition: 0,
                offset: 0,
                timestamp: Some(1)
            }]
        );
    }

    #[tokio::test]
    async fn refused_record_is_reported_not_returned() {
        struct Refusing;
        impl ProduceClient for Refusing {
            fn enqueue(&self, _: OutboundRecord) -> Result<DeliveryFuture, ProduceError> {
                Err(ProduceError::new("queue full"))
            }
            fn flush(&self, _: Duration) -> Result<(), ProduceError> {
                Ok(())
            }
        }
        let sink = MemorySink::new();
        let p = publisher(Arc::new(Refusing), &sink);

        p.send("posts", "k", &"v").unwrap();

        match &sink.publish_outcomes()[..] {
            [PublishOutcome::Failure { topic, value, cause }] => {
                assert_eq!(topic, "posts");
                assert_eq!(value, "\"v\"");
                assert_eq!(cause, "queue full");
            }
            other => panic!("unexpected outcomes {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_twice_flushes_once() {
        let client = Arc::new(RecordingClient::default());
        let p = publisher(client.clone(), &MemorySink::new());

        p.close().await.unwrap();
        p.close().await.unwrap();

        assert!(p.is_closed());
        assert_eq!(client.flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let client = Arc::new(RecordingClient::default());
        let p = publisher(client.clone(), &MemorySink::new());
        p.close().await.unwrap();

        let err = p.send("posts", &1u64, &"late").unwrap_err();
        assert!(err.is_closed());
        assert!(client.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unencodable_value_is_rejected() {
        use std::collections::HashMap;
        // Non-string map keys cannot be encoded as JSON objects.
        let mut value = HashMap::new();
        value.insert(vec![1u8], 1);
        let p = publisher(Arc::new(RecordingClient::default()), &MemorySink::new());
        let err = p.send("posts", &1i64, &value).unwrap_err();
        assert!(matches!(err, PublishError::Encode { .. }));
    }
}
