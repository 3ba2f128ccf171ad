//! Kafka broker client for `postrelay` (companion crate).
//!
//! Enable the `client` feature to get [`KafkaAdmin`] (topic creation and listing) and
//! [`KafkaProduceClient`] (asynchronous produce), both on `rdkafka`.

#[cfg(feature = "client")]
mod client;

#[cfg(feature = "client")]
pub use client::{admin_config, client_config, KafkaAdmin, KafkaProduceClient};
