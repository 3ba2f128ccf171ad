//! `postrelay`: wait for Kafka and the schema registry, then relay posts into Kafka.
//!
//! Usage: `postrelay [CONFIG.json]` (or set `POSTRELAY_CONFIG`). Log verbosity follows
//! `RUST_LOG`, defaulting to `info`.

use postrelay::config::CONFIG_PATH_ENV;
use postrelay::prelude::*;
use postrelay::stream::StreamSource;
use postrelay::{HttpHealthProbe, RetryPolicyBuilder};
use postrelay_kafka::{KafkaAdmin, KafkaProduceClient};
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(err.as_ref());
            ExitCode::FAILURE
        }
    }
}

fn config_path() -> Result<String, BoxError> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .ok_or_else(|| format!("no config file given: pass a path or set {CONFIG_PATH_ENV}").into())
}

async fn run() -> Result<(), BoxError> {
    let cfg = RelayConfig::from_path(config_path()?)?;
    tracing::info!("{}", cfg.stream.welcome_message);

    let sink: Arc<dyn EventSink> = Arc::new(LogSink);
    let retry = RetryPolicyBuilder::from_config(&cfg.retry)?.with_sink(sink.clone()).build()?;
    let poller = Poller::from_config(&cfg.retry)?.with_sink(sink.clone());

    let topic_admin = TopicAdmin::new(KafkaAdmin::new(&cfg.kafka)?, retry, poller.clone());
    let registry =
        RegistryHealthChecker::new(HttpHealthProbe::new(cfg.kafka.registry_timeout())?, poller);
    let ready = ReadinessOrchestrator::new(
        topic_admin,
        registry,
        cfg.kafka.topic_specs()?,
        cfg.kafka.schema_registry_url.clone(),
    )
    .verify_topic_visibility(cfg.readiness.verify_topic_visibility)
    .with_sink(sink.clone())
    .run()
    .await?;

    let producer = KafkaProduceClient::new(&cfg.kafka, &cfg.producer)?;
    let publisher =
        Arc::new(EventPublisher::new(Arc::new(producer), sink, cfg.producer.close_timeout())?);
    let listener = Arc::new(RelayListener::new(publisher.clone(), cfg.kafka.topic()));

    let source: Box<dyn StreamSource> = if cfg.stream.enable_mock_posts {
        Box::new(MockStreamSource::new(&cfg.stream))
    } else {
        Box::new(JsonLinesSource::new(BufReader::new(tokio::io::stdin()), &cfg.stream.keywords))
    };

    let stream = StreamRunner::start(source, listener, &ready);
    let streamed = stream
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for ctrl-c; shutting down");
            }
        })
        .await;

    // Close even when the source failed, so queued records get flushed.
    publisher.close().await?;
    streamed?;
    Ok(())
}

fn report(err: &(dyn Error + 'static)) {
    tracing::error!(error = %err, "postrelay failed");
    eprintln!("postrelay: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}
