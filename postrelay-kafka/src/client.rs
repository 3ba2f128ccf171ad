use async_trait::async_trait;
use futures::FutureExt;
use postrelay::config::{KafkaConfig, ProducerConfig};
use postrelay::publisher::DeliveryFuture;
use postrelay::{
    BrokerAdmin, BrokerError, DeliveryReceipt, OutboundRecord, ProduceClient, ProduceError,
    TopicListingSnapshot, TopicSpec,
};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;

/// Client settings shared by the admin client and the producer.
pub fn admin_config(kafka: &KafkaConfig) -> ClientConfig {
    let mut cfg = ClientConfig::new();
    cfg.set("bootstrap.servers", &kafka.bootstrap_servers);
    cfg
}

/// Producer settings: broker coordinates plus the producer tuning knobs.
pub fn client_config(kafka: &KafkaConfig, producer: &ProducerConfig) -> ClientConfig {
    let mut cfg = admin_config(kafka);
    cfg.set("acks", &producer.acks)
        .set("compression.type", &producer.compression_type)
        .set("linger.ms", producer.linger_ms.to_string())
        .set("batch.size", producer.batch_size.to_string())
        .set("request.timeout.ms", producer.request_timeout_ms.to_string());
    cfg
}

/// [`BrokerAdmin`] over an `rdkafka` admin client.
#[derive(Clone)]
pub struct KafkaAdmin {
    client: Arc<AdminClient<DefaultClientContext>>,
    timeout: Duration,
}

impl std::fmt::Debug for KafkaAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaAdmin").field("timeout", &self.timeout).finish()
    }
}

impl KafkaAdmin {
    pub fn new(kafka: &KafkaConfig) -> Result<Self, KafkaError> {
        let client = admin_config(kafka).create()?;
        Ok(Self::from_client(client, kafka.admin_timeout()))
    }

    /// Wrap an existing admin client; `timeout` bounds each admin RPC.
    pub fn from_client(client: AdminClient<DefaultClientContext>, timeout: Duration) -> Self {
        Self { client: Arc::new(client), timeout }
    }
}

fn new_topic(spec: &TopicSpec) -> NewTopic<'_> {
    let partitions = i32::try_from(spec.partitions()).unwrap_or(i32::MAX);
    let replication = i32::try_from(spec.replication_factor()).unwrap_or(i32::MAX);
    NewTopic::new(spec.name(), partitions, TopicReplication::Fixed(replication))
}

#[async_trait]
impl BrokerAdmin for KafkaAdmin {
    async fn create_topics(&self, specs: &[TopicSpec]) -> Result<(), BrokerError> {
        let topics: Vec<NewTopic<'_>> = specs.iter().map(new_topic).collect();
        let opts = AdminOptions::new().request_timeout(Some(self.timeout));
        let results = self
            .client
            .create_topics(&topics, &opts)
            .await
            .map_err(|e| BrokerError::new("create_topics", e.to_string()))?;
        for result in results {
            match result {
                Ok(name) => tracing::info!(topic = %name, "topic created"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    tracing::info!(topic = %name, "topic already exists")
                }
                Err((name, code)) => {
                    tracing::warn!(topic = %name, error = %code, "broker rejected topic creation")
                }
            }
        }
        Ok(())
    }

    async fn list_topics(&self) -> Result<Option<TopicListingSnapshot>, BrokerError> {
        let client = Arc::clone(&self.client);
        let timeout = self.timeout;
        // Metadata fetches block the calling thread.
        let names = tokio::task::spawn_blocking(move || -> Result<_, KafkaError> {
            let metadata = client.inner().fetch_metadata(None, timeout)?;
            if metadata.brokers().is_empty() {
                return Ok(None);
            }
            Ok(Some(
                metadata
                    .topics()
                    .iter()
                    .filter(|t| t.error().is_none())
                    .map(|t| t.name().to_owned())
                    .collect::<Vec<_>>(),
            ))
        })
        .await
        .map_err(|e| BrokerError::new("list_topics", e.to_string()))?
        .map_err(|e| BrokerError::new("list_topics", e.to_string()))?;
        Ok(names.map(TopicListingSnapshot::new))
    }
}

/// [`ProduceClient`] over an `rdkafka` future producer.
///
/// The `rdkafka` delivery result only carries the partition and offset, so receipts from
/// this client never report a timestamp: [`DeliveryReceipt::timestamp`] is always `None`.
#[derive(Clone)]
pub struct KafkaProduceClient {
    producer: FutureProducer,
}

impl std::fmt::Debug for KafkaProduceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaProduceClient").finish_non_exhaustive()
    }
}

impl KafkaProduceClient {
    pub fn new(kafka: &KafkaConfig, producer: &ProducerConfig) -> Result<Self, KafkaError> {
        Ok(Self::from_producer(client_config(kafka, producer).create()?))
    }

    /// Create a client with an existing Kafka producer.
    pub fn from_producer(producer: FutureProducer) -> Self {
        Self { producer }
    }
}

impl ProduceClient for KafkaProduceClient {
    fn enqueue(&self, record: OutboundRecord) -> Result<DeliveryFuture, ProduceError> {
        let future_record =
            FutureRecord::to(&record.topic).key(&record.key[..]).payload(&record.payload[..]);
        let delivery = self
            .producer
            .send_result(future_record)
            .map_err(|(e, _)| ProduceError::new(e.to_string()))?;
        Ok(async move {
            match delivery.await {
                Ok(Ok((partition, offset))) => {
                    Ok(DeliveryReceipt { partition, offset, timestamp: None })
                }
                Ok(Err((e, _message))) => Err(ProduceError::new(e.to_string())),
                Err(_canceled) => Err(ProduceError::new("delivery canceled: producer dropped")),
            }
        }
        .boxed())
    }

    fn flush(&self, timeout: Duration) -> Result<(), ProduceError> {
        self.producer.flush(timeout).map_err(|e| ProduceError::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kafka() -> KafkaConfig {
        KafkaConfig {
            bootstrap_servers: "broker-1:9092,broker-2:9092".into(),
            schema_registry_url: "http://registry:8081".into(),
            topic_name: "posts".into(),
            topic_names_to_create: vec!["posts".into()],
            num_of_partitions: 3,
            replication_factor: 1,
            admin_timeout_ms: 5_000,
            registry_timeout_ms: 2_000,
        }
    }

    #[test]
    fn producer_config_carries_tuning() {
        let cfg = client_config(&kafka(), &ProducerConfig::default());
        assert_eq!(cfg.get("bootstrap.servers"), Some("broker-1:9092,broker-2:9092"));
        assert_eq!(cfg.get("acks"), Some("all"));
        assert_eq!(cfg.get("compression.type"), Some("snappy"));
        assert_eq!(cfg.get("linger.ms"), Some("5"));
        assert_eq!(cfg.get("batch.size"), Some("16384"));
        assert_eq!(cfg.get("request.timeout.ms"), Some("60000"));
    }

    #[test]
    fn new_topic_uses_spec_counts() {
        let spec = TopicSpec::new("posts", 6, 2).unwrap();
        let topic = new_topic(&spec);
        assert_eq!(topic.name, "posts");
        assert_eq!(topic.num_partitions, 6);
        assert!(matches!(topic.replication, TopicReplication::Fixed(2)));
    }
}
