//! Schema registry health polling.

use crate::error::HealthError;
use crate::poll::{PollError, PollStatus, Poller};
use async_trait::async_trait;
use std::convert::Infallible;

/// A health request could not be completed at the network level.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Connection refused, DNS failure, timeout and the like.
    #[error("health request to {url} failed: {message}")]
    Transport { url: String, message: String },
    /// The HTTP client could not be constructed.
    #[error("http client build failed: {0}")]
    Client(String),
}

/// Issues one lightweight request against a health endpoint and reports the status code.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn status(&self, url: &str) -> Result<u16, ProbeError>;
}

#[async_trait]
impl<P: HealthProbe + ?Sized> HealthProbe for std::sync::Arc<P> {
    async fn status(&self, url: &str) -> Result<u16, ProbeError> {
        (**self).status(url).await
    }
}

/// `GET <url>` over HTTP; the body is ignored.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpHealthProbe {
    /// Probe whose requests give up after `timeout`.
    pub fn new(timeout: std::time::Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProbeError::Client(err.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn status(&self, url: &str) -> Result<u16, ProbeError> {
        let response = self.client.get(url).send().await.map_err(|err| ProbeError::Transport {
            url: url.to_owned(),
            message: err.to_string(),
        })?;
        Ok(response.status().as_u16())
    }
}

/// Waits for the schema registry to answer with a 2xx status.
#[derive(Debug)]
pub struct RegistryHealthChecker<P> {
    probe: P,
    poller: Poller,
}

impl<P: HealthProbe> RegistryHealthChecker<P> {
    pub fn new(probe: P, poller: Poller) -> Self {
        Self { probe, poller }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Poll `url` until it answers 2xx.
    ///
    /// Non-2xx answers and network failures both count as "not healthy yet"; only the
    /// attempt budget ends the loop with an error.
    pub async fn wait_until_healthy(&self, url: &str) -> Result<(), HealthError> {
        tracing::info!(%url, "checking schema registry health");
        let polls = self
            .poller
            .poll_until("schema registry healthy", || async {
                let status = match self.probe.status(url).await {
                    Ok(code) if is_healthy(code) => PollStatus::Ready,
                    Ok(code) => {
                        tracing::warn!(%url, status = code, "schema registry not healthy yet");
                        PollStatus::Pending
                    }
                    Err(err) => {
                        tracing::warn!(%url, error = %err, "schema registry unreachable");
                        PollStatus::Pending
                    }
                };
                Ok::<_, Infallible>(status)
            })
            .await
            .map_err(|e| match e {
                PollError::Probe(never) => match never {},
                PollError::TimedOut(timeout) => {
                    tracing::error!(
                        %url,
                        attempts = timeout.attempts,
                        "reached max number of retry attempts to check schema registry health"
                    );
                    HealthError::Unhealthy(timeout)
                }
            })?;
        tracing::info!(%url, polls, "schema registry is healthy");
        Ok(())
    }
}

fn is_healthy(status: u16) -> bool {
    (200..300).contains(&status)
}
