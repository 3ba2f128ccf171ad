#![allow(dead_code)]

//! Fakes for the broker, the registry and the produce path.

use async_trait::async_trait;
use futures::FutureExt;
use postrelay::publisher::DeliveryFuture;
use postrelay::{
    BrokerAdmin, BrokerError, DeliveryReceipt, HealthProbe, OutboundRecord, ProbeError,
    ProduceClient, ProduceError, TopicListingSnapshot, TopicSpec,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

/// Log output captured by [`capture_logs`].
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = LogGuard;
    fn make_writer(&'a self) -> Self::Writer {
        LogGuard(self.0.clone())
    }
}

pub struct LogGuard(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route this thread's tracing output into a buffer until the guard drops.
pub fn capture_logs() -> (tracing::subscriber::DefaultGuard, CapturedLogs) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(logs.clone()))
        .with_ansi(false)
        .without_time()
        .finish();
    (tracing::subscriber::set_default(subscriber), logs)
}

/// Broker whose topic listing follows a script, one entry per listing query.
/// The last entry repeats once the script runs out.
#[derive(Debug, Default)]
pub struct FakeBroker {
    listings: Mutex<Vec<Vec<String>>>,
    created: Mutex<Vec<Vec<TopicSpec>>>,
    list_calls: AtomicUsize,
}

impl FakeBroker {
    pub fn with_listings(listings: &[&[&str]]) -> Self {
        Self {
            listings: Mutex::new(
                listings.iter().map(|l| l.iter().map(|s| s.to_string()).collect()).collect(),
            ),
            ..Default::default()
        }
    }

    /// A broker where `topic` is absent for `absent_polls` queries and listed afterwards.
    pub fn visible_from(topic: &str, absent_polls: usize) -> Self {
        let absent: &[&str] = &[];
        let mut script = vec![absent; absent_polls];
        let present = [topic];
        script.push(&present);
        Self::with_listings(&script)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_requests(&self) -> Vec<Vec<TopicSpec>> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerAdmin for FakeBroker {
    async fn create_topics(&self, specs: &[TopicSpec]) -> Result<(), BrokerError> {
        self.created.lock().unwrap().push(specs.to_vec());
        Ok(())
    }

    async fn list_topics(&self) -> Result<Option<TopicListingSnapshot>, BrokerError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut listings = self.listings.lock().unwrap();
        let current = if listings.len() > 1 {
            listings.remove(0)
        } else {
            listings.first().cloned().unwrap_or_default()
        };
        Ok(Some(TopicListingSnapshot::new(current)))
    }
}

/// Registry that answers every health request with the same status.
#[derive(Debug)]
pub struct FakeRegistry {
    status: Option<u16>,
    calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn answering(status: u16) -> Self {
        Self { status: Some(status), calls: AtomicUsize::new(0) }
    }

    /// Every request fails at the network level.
    pub fn unreachable() -> Self {
        Self { status: None, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for FakeRegistry {
    async fn status(&self, url: &str) -> Result<u16, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.status.ok_or_else(|| ProbeError::Transport {
            url: url.to_owned(),
            message: "connection refused".into(),
        })
    }
}

/// How the fake producer acknowledges records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Acknowledge immediately with increasing offsets.
    Immediate,
    /// Never acknowledge.
    Never,
    /// Reject every record on delivery.
    Fail,
}

#[derive(Debug)]
pub struct FakeProducer {
    ack: Ack,
    records: Mutex<Vec<OutboundRecord>>,
    flushes: AtomicUsize,
}

impl FakeProducer {
    pub fn new(ack: Ack) -> Self {
        Self { ack, records: Mutex::new(Vec::new()), flushes: AtomicUsize::new(0) }
    }

    pub fn records(&self) -> Vec<OutboundRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl ProduceClient for FakeProducer {
    fn enqueue(&self, record: OutboundRecord) -> Result<DeliveryFuture, ProduceError> {
        let offset = {
            let mut records = self.records.lock().unwrap();
            records.push(record);
            records.len() as i64 - 1
        };
        Ok(match self.ack {
            Ack::Immediate => {
                async move { Ok(DeliveryReceipt { partition: 0, offset, timestamp: Some(offset) }) }
                    .boxed()
            }
            Ack::Never => futures::future::pending().boxed(),
            Ack::Fail => async { Err(ProduceError::new("broker unavailable")) }.boxed(),
        })
    }

    fn flush(&self, _timeout: Duration) -> Result<(), ProduceError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// The configuration used by the startup scenarios.
pub const SCENARIO_CONFIG: &str = r#"{
    "kafka": {
        "bootstrap_servers": "localhost:9092",
        "schema_registry_url": "http://localhost:8081",
        "topic_name": "posts-avro",
        "topic_names_to_create": ["posts-avro"]
    },
    "retry": {
        "max_attempts": 3,
        "initial_interval_ms": 100,
        "max_interval_ms": 10000,
        "multiplier": 2.0,
        "sleep_time_ms": 100
    }
}"#;
