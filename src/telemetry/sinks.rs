use super::events::{PollEvent, PublishOutcome, RelayEvent, RetryEvent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Observer capability for relay events.
///
/// `emit` may be called from any thread, including the broker client's delivery threads, so
/// implementations must be cheap and must not block for long.
pub trait EventSink: Send + Sync + std::fmt::Debug {
    fn emit(&self, event: RelayEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: RelayEvent) {
        (**self).emit(event)
    }
}

/// A sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: RelayEvent) {}
}

/// A sink that logs events using the `tracing` crate.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: RelayEvent) {
        match &event {
            RelayEvent::Retry(RetryEvent::AttemptFailed { operation, attempt, error, next_delay }) => {
                tracing::warn!(%operation, attempt, %error, next_delay = ?next_delay, "attempt failed");
            }
            RelayEvent::Retry(RetryEvent::Exhausted { operation, attempts, last_error }) => {
                tracing::error!(%operation, attempts, %last_error, "reached max number of retry attempts");
            }
            RelayEvent::Retry(RetryEvent::Succeeded { operation, attempts }) => {
                tracing::debug!(%operation, attempts, "operation succeeded");
            }
            RelayEvent::Poll(PollEvent::Pending { check, attempt, next_delay })
            | RelayEvent::Poll(PollEvent::Unknown { check, attempt, next_delay }) => {
                tracing::debug!(%check, attempt, next_delay = ?next_delay, event = %event, "condition not met yet");
            }
            RelayEvent::Poll(PollEvent::Ready { check, attempts }) => {
                tracing::debug!(%check, attempts, "condition met");
            }
            RelayEvent::Poll(PollEvent::TimedOut { check, attempts }) => {
                tracing::error!(%check, attempts, "gave up waiting");
            }
            RelayEvent::Publish(PublishOutcome::Success { topic, partition, offset, timestamp }) => {
                tracing::debug!(%topic, partition, offset, timestamp = ?timestamp, "record delivered");
            }
            RelayEvent::Publish(PublishOutcome::Failure { topic, value, cause }) => {
                tracing::error!(%topic, %value, %cause, "error while sending record");
            }
            RelayEvent::Readiness(r) => {
                tracing::info!(event = %r, "readiness");
            }
        }
    }
}

/// A sink that stores events in memory, evicting the oldest beyond `capacity`.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<VecDeque<RelayEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn events(&self) -> Vec<RelayEvent> {
        self.lock().iter().cloned().collect()
    }

    /// Publish outcomes only, in arrival order.
    pub fn publish_outcomes(&self) -> Vec<PublishOutcome> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                RelayEvent::Publish(o) => Some(o.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RelayEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: RelayEvent) {
        let mut guard = self.lock();
        if guard.len() >= self.capacity {
            guard.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push_back(event);
    }
}

/// Forwards every event to two sinks.
#[derive(Clone, Debug)]
pub struct MulticastSink<A, B> {
    sink_a: A,
    sink_b: B,
}

impl<A, B> MulticastSink<A, B> {
    pub fn new(sink_a: A, sink_b: B) -> Self {
        Self { sink_a, sink_b }
    }
}

impl<A: EventSink, B: EventSink> EventSink for MulticastSink<A, B> {
    fn emit(&self, event: RelayEvent) {
        self.sink_a.emit(event.clone());
        self.sink_b.emit(event);
    }
}
