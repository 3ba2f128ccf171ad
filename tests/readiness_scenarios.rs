mod common;

use async_trait::async_trait;
use common::{FakeBroker, FakeRegistry, SCENARIO_CONFIG};
use postrelay::stream::{PostListener, RawPost, StreamError, StreamSource};
use postrelay::telemetry::{PollEvent, ReadinessEvent};
use postrelay::{
    MemorySink, Poller, ReadinessError, ReadinessOrchestrator, RelayConfig, RelayEvent,
    RetryPolicyBuilder, StreamHandle, StreamRunner, TopicAdmin, TrackingSleeper,
};
use postrelay::{RegistryHealthChecker, Sleeper};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Orchestrator = ReadinessOrchestrator<Arc<FakeBroker>, Arc<FakeRegistry>>;

fn orchestrator(
    cfg: &RelayConfig,
    broker: &Arc<FakeBroker>,
    registry: &Arc<FakeRegistry>,
    sleeper: &TrackingSleeper,
    sink: &MemorySink,
) -> Orchestrator {
    let sleeper: Arc<dyn Sleeper> = Arc::new(sleeper.clone());
    let retry = RetryPolicyBuilder::from_config(&cfg.retry)
        .unwrap()
        .with_shared_sleeper(sleeper.clone())
        .build()
        .unwrap();
    let poller = Poller::from_config(&cfg.retry)
        .unwrap()
        .with_sleeper(sleeper)
        .with_sink(Arc::new(sink.clone()));
    ReadinessOrchestrator::new(
        TopicAdmin::new(broker.clone(), retry, poller.clone()),
        RegistryHealthChecker::new(registry.clone(), poller),
        cfg.kafka.topic_specs().unwrap(),
        cfg.kafka.schema_registry_url.clone(),
    )
    .verify_topic_visibility(cfg.readiness.verify_topic_visibility)
    .with_sink(Arc::new(sink.clone()))
}

/// Records whether it was ever started.
struct FlagSource(Arc<AtomicBool>);

#[async_trait]
impl StreamSource for FlagSource {
    async fn run(
        self: Box<Self>,
        _listener: Arc<dyn PostListener>,
        _cancel: CancellationToken,
    ) -> Result<(), StreamError> {
        self.0.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct Ignore;

impl PostListener for Ignore {
    fn on_post(&self, _post: RawPost) {}
}

/// Startup as the binary does it: the stream only starts after readiness.
async fn start_relay(
    orchestrator: &Orchestrator,
    started: &Arc<AtomicBool>,
) -> Result<StreamHandle, ReadinessError> {
    let ready = orchestrator.run().await?;
    Ok(StreamRunner::start(Box::new(FlagSource(started.clone())), Arc::new(Ignore), &ready))
}

#[tokio::test]
async fn topic_visible_on_third_poll_succeeds_after_two_sleeps() {
    let cfg = RelayConfig::from_json_str(SCENARIO_CONFIG).unwrap();
    let broker = Arc::new(FakeBroker::visible_from("posts-avro", 2));
    let registry = Arc::new(FakeRegistry::answering(200));
    let sleeper = TrackingSleeper::new();
    let sink = MemorySink::new();
    let started = Arc::new(AtomicBool::new(false));

    let handle = start_relay(&orchestrator(&cfg, &broker, &registry, &sleeper, &sink), &started)
        .await
        .expect("readiness should pass");
    handle.shutdown().await.unwrap();

    assert_eq!(sleeper.calls(), vec![Duration::from_millis(100), Duration::from_millis(200)]);
    assert_eq!(broker.list_calls(), 3);
    assert_eq!(broker.create_requests().len(), 1);
    assert_eq!(registry.calls(), 1);
    assert!(started.load(Ordering::SeqCst));

    let readiness: Vec<ReadinessEvent> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            RelayEvent::Readiness(r) => Some(r),
            _ => None,
        })
        .collect();
    assert_eq!(
        readiness,
        vec![
            ReadinessEvent::TopicsCreated { topics: vec!["posts-avro".into()] },
            ReadinessEvent::TopicsVisible { topics: vec!["posts-avro".into()] },
            ReadinessEvent::RegistryHealthy { url: "http://localhost:8081".into() },
            ReadinessEvent::Ready,
        ]
    );
}

#[tokio::test]
async fn topic_never_visible_within_budget_aborts_startup() {
    let cfg = RelayConfig::from_json_str(SCENARIO_CONFIG).unwrap();
    let broker = Arc::new(FakeBroker::visible_from("posts-avro", 3));
    let registry = Arc::new(FakeRegistry::answering(200));
    let started = Arc::new(AtomicBool::new(false));
    let o = orchestrator(&cfg, &broker, &registry, &TrackingSleeper::new(), &MemorySink::new());

    let err = start_relay(&o, &started).await.unwrap_err();

    assert!(err.is_readiness_timeout());
    assert_eq!(err.readiness_timeout().map(|t| t.attempts), Some(3));
    assert_eq!(registry.calls(), 0, "registry is only checked after topics are ready");
    assert!(!started.load(Ordering::SeqCst));
}

#[tokio::test]
async fn registry_503_on_every_attempt_aborts_startup() {
    let cfg = RelayConfig::from_json_str(SCENARIO_CONFIG).unwrap();
    let broker = Arc::new(FakeBroker::visible_from("posts-avro", 0));
    let registry = Arc::new(FakeRegistry::answering(503));
    let sleeper = TrackingSleeper::new();
    let sink = MemorySink::new();
    let started = Arc::new(AtomicBool::new(false));

    let err = start_relay(&orchestrator(&cfg, &broker, &registry, &sleeper, &sink), &started)
        .await
        .unwrap_err();

    assert!(matches!(err, ReadinessError::Registry(_)));
    assert!(err.is_readiness_timeout());
    assert_eq!(registry.calls(), 3);
    assert_eq!(sleeper.calls(), vec![Duration::from_millis(100), Duration::from_millis(200)]);
    assert!(!started.load(Ordering::SeqCst));
    assert!(sink
        .events()
        .iter()
        .any(|e| matches!(e, RelayEvent::Poll(PollEvent::TimedOut { attempts: 3, .. }))));
    assert!(!sink.events().contains(&RelayEvent::Readiness(ReadinessEvent::Ready)));
}

#[tokio::test]
async fn unreachable_registry_is_retried_then_times_out() {
    let cfg = RelayConfig::from_json_str(SCENARIO_CONFIG).unwrap();
    let broker = Arc::new(FakeBroker::visible_from("posts-avro", 0));
    let registry = Arc::new(FakeRegistry::unreachable());
    let o = orchestrator(&cfg, &broker, &registry, &TrackingSleeper::new(), &MemorySink::new());

    let err = o.run().await.unwrap_err();

    assert!(err.is_readiness_timeout());
    assert_eq!(registry.calls(), 3);
}

#[tokio::test]
async fn visibility_check_can_be_disabled_by_config() {
    let raw = SCENARIO_CONFIG.replacen(
        r#""retry""#,
        r#""readiness": { "verify_topic_visibility": false }, "retry""#,
        1,
    );
    let cfg = RelayConfig::from_json_str(&raw).unwrap();
    // The topic never shows up, which does not matter with the check disabled.
    let broker = Arc::new(FakeBroker::with_listings(&[]));
    let registry = Arc::new(FakeRegistry::answering(204));
    let o = orchestrator(&cfg, &broker, &registry, &TrackingSleeper::new(), &MemorySink::new());

    let ready = o.run().await.unwrap();

    assert_eq!(ready.topics(), ["posts-avro".to_string()]);
    assert_eq!(broker.list_calls(), 0);
}
