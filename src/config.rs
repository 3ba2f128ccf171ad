//! Process configuration.
//!
//! Loaded once at startup from a JSON document and shared read-only afterwards. Field names
//! are `snake_case`; every section except `kafka` may be omitted and falls back to defaults.
//!
//! ```rust
//! use postrelay::config::RelayConfig;
//!
//! let cfg = RelayConfig::from_json_str(r#"{
//!     "kafka": {
//!         "bootstrap_servers": "localhost:9092",
//!         "schema_registry_url": "http://localhost:8081/subjects",
//!         "topic_name": "posts-avro",
//!         "topic_names_to_create": ["posts-avro"]
//!     }
//! }"#).unwrap();
//! assert_eq!(cfg.retry.max_attempts, 3);
//! assert_eq!(cfg.kafka.topic_specs().unwrap()[0].name(), "posts-avro");
//! ```
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable consulted for the config path when no CLI argument is given.
pub const CONFIG_PATH_ENV: &str = "POSTRELAY_CONFIG";

/// Errors produced while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Retry and polling parameters shared by every retrying component.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts (initial try included) for retries and polls alike.
    pub max_attempts: u32,
    /// Delay before the first retry of a failed RPC.
    pub initial_interval_ms: u64,
    /// Cap for the RPC retry delay.
    pub max_interval_ms: u64,
    /// Growth factor for both the RPC retry delay and the poll interval.
    pub multiplier: f64,
    /// Seed interval for readiness polling; grows by `multiplier` without a cap.
    pub sleep_time_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_ms: 1_000,
            max_interval_ms: 10_000,
            multiplier: 2.0,
            sleep_time_ms: 2_000,
        }
    }
}

impl RetryConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn sleep_time(&self) -> Duration {
        Duration::from_millis(self.sleep_time_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be > 0"));
        }
        if self.initial_interval_ms == 0 {
            return Err(invalid("retry.initial_interval_ms must be > 0"));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(invalid(format!(
                "retry.max_interval_ms ({}) must be >= retry.initial_interval_ms ({})",
                self.max_interval_ms, self.initial_interval_ms
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(invalid(format!(
                "retry.multiplier must be a finite number >= 1.0 (got {})",
                self.multiplier
            )));
        }
        if self.sleep_time_ms == 0 {
            return Err(invalid("retry.sleep_time_ms must be > 0"));
        }
        Ok(())
    }
}

/// A topic the relay depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    name: String,
    partitions: u32,
    replication_factor: u32,
}

impl TopicSpec {
    /// Build a topic spec, trimming the name. Rejects empty names and zero counts.
    pub fn new(
        name: impl AsRef<str>,
        partitions: u32,
        replication_factor: u32,
    ) -> Result<Self, ConfigError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(invalid("topic name must not be empty"));
        }
        if partitions == 0 {
            return Err(invalid(format!("topic {name}: partitions must be > 0")));
        }
        if replication_factor == 0 {
            return Err(invalid(format!("topic {name}: replication factor must be > 0")));
        }
        Ok(Self { name: name.to_owned(), partitions, replication_factor })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    pub fn replication_factor(&self) -> u32 {
        self.replication_factor
    }
}

/// Broker and registry coordinates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub schema_registry_url: String,
    /// Topic every post is published to. Read it through [`KafkaConfig::topic`].
    pub topic_name: String,
    pub topic_names_to_create: Vec<String>,
    #[serde(default = "default_partitions")]
    pub num_of_partitions: u32,
    #[serde(default = "default_replication")]
    pub replication_factor: u32,
    /// Timeout for a single admin RPC (metadata fetch).
    #[serde(default = "default_admin_timeout_ms")]
    pub admin_timeout_ms: u64,
    /// Timeout for a single registry health request.
    #[serde(default = "default_registry_timeout_ms")]
    pub registry_timeout_ms: u64,
}

fn default_partitions() -> u32 {
    3
}

fn default_replication() -> u32 {
    3
}

fn default_admin_timeout_ms() -> u64 {
    5_000
}

fn default_registry_timeout_ms() -> u64 {
    2_000
}

impl KafkaConfig {
    /// Derive one `TopicSpec` per configured name.
    pub fn topic_specs(&self) -> Result<Vec<TopicSpec>, ConfigError> {
        self.topic_names_to_create
            .iter()
            .map(|name| TopicSpec::new(name, self.num_of_partitions, self.replication_factor))
            .collect()
    }

    /// The publish topic, trimmed the same way created topic names are.
    pub fn topic(&self) -> &str {
        self.topic_name.trim()
    }

    /// Trimmed names of the topics to create, in configuration order.
    pub fn topic_names(&self) -> Vec<String> {
        self.topic_names_to_create.iter().map(|n| n.trim().to_owned()).collect()
    }

    pub fn admin_timeout(&self) -> Duration {
        Duration::from_millis(self.admin_timeout_ms)
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err(invalid("kafka.bootstrap_servers must not be empty"));
        }
        if self.schema_registry_url.trim().is_empty() {
            return Err(invalid("kafka.schema_registry_url must not be empty"));
        }
        if self.topic().is_empty() {
            return Err(invalid("kafka.topic_name must not be empty"));
        }
        if self.topic_names_to_create.is_empty() {
            return Err(invalid("kafka.topic_names_to_create must list at least one topic"));
        }
        self.topic_specs()?;
        Ok(())
    }
}

/// Producer tuning passed through to the broker client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub acks: String,
    pub compression_type: String,
    pub linger_ms: u64,
    pub batch_size: u64,
    pub request_timeout_ms: u64,
    /// Upper bound for flushing and draining in-flight deliveries on close.
    pub close_timeout_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            acks: "all".into(),
            compression_type: "snappy".into(),
            linger_ms: 5,
            batch_size: 16_384,
            request_timeout_ms: 60_000,
            close_timeout_ms: 10_000,
        }
    }
}

impl ProducerConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

/// Which stream source feeds the relay, and its parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Keyword filter; posts matching none of these are dropped by filtering sources.
    pub keywords: Vec<String>,
    pub welcome_message: String,
    /// Generate random posts instead of reading the live source.
    pub enable_mock_posts: bool,
    pub mock_sleep_ms: u64,
    pub mock_min_post_length: usize,
    pub mock_max_post_length: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            welcome_message: "post relay starting".into(),
            enable_mock_posts: false,
            mock_sleep_ms: 1_000,
            mock_min_post_length: 5,
            mock_max_post_length: 15,
        }
    }
}

impl StreamConfig {
    pub fn mock_sleep(&self) -> Duration {
        Duration::from_millis(self.mock_sleep_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mock_min_post_length == 0 {
            return Err(invalid("stream.mock_min_post_length must be > 0"));
        }
        if self.mock_max_post_length < self.mock_min_post_length {
            return Err(invalid(format!(
                "stream.mock_max_post_length ({}) must be >= stream.mock_min_post_length ({})",
                self.mock_max_post_length, self.mock_min_post_length
            )));
        }
        Ok(())
    }
}

/// Startup readiness options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Poll cluster metadata until created topics are listed before checking the registry.
    pub verify_topic_visibility: bool,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self { verify_topic_visibility: true }
    }
}

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelayConfig {
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
}

impl RelayConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: RelayConfig = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.kafka.validate()?;
        self.retry.validate()?;
        self.stream.validate()?;
        Ok(())
    }
}
