#![allow(dead_code)]

use edgekite_agent::buffer::Batch;
use edgekite_agent::delivery::{CoordinatorConfig, DeliveryCoordinator};
use edgekite_agent::domain::{EventRecord, SourceContext};
use edgekite_agent::sender::{
    DeliveryOutcome, DeliveryTransport, FailureReason, Payload, UnloadStrategyKind,
    UnloadTransport,
};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One call to `deliver`: the event types in the batch and whether it was
/// accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub events: Vec<String>,
    pub delivered: bool,
}

/// Async transport that replays scripted outcomes, then accepts everything.
#[derive(Default)]
pub struct RecordingTransport {
    script: Mutex<VecDeque<DeliveryOutcome>>,
    attempts: Mutex<Vec<Attempt>>,
    delay: Option<Duration>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_next(&self, reason: FailureReason) {
        self.script.lock().push_back(DeliveryOutcome::failed(reason));
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Event types of accepted batches, in delivery order.
    pub fn delivered_events(&self) -> Vec<String> {
        self.attempts
            .lock()
            .iter()
            .filter(|a| a.delivered)
            .flat_map(|a| a.events.clone())
            .collect()
    }
}

impl DeliveryTransport for RecordingTransport {
    fn deliver<'a>(&'a self, batch: &'a Batch) -> BoxFuture<'a, DeliveryOutcome> {
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(DeliveryOutcome::Delivered { status: 200 });
        self.attempts.lock().push(Attempt {
            events: event_types(batch.records()),
            delivered: outcome.is_delivered(),
        });

        let delay = self.delay;
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            outcome
        }
        .boxed()
    }
}

/// Unload transport that keeps every payload it is handed.
pub struct RecordingUnload {
    payloads: Mutex<Vec<Vec<String>>>,
    kind: UnloadStrategyKind,
}

impl RecordingUnload {
    pub fn new() -> Self {
        Self {
            payloads: Mutex::new(Vec::new()),
            kind: UnloadStrategyKind::Beacon,
        }
    }

    pub fn payloads(&self) -> Vec<Vec<String>> {
        self.payloads.lock().clone()
    }

    pub fn send_count(&self) -> usize {
        self.payloads.lock().len()
    }
}

impl UnloadTransport for RecordingUnload {
    fn send_unload(&self, payload: Payload) {
        let records: Vec<serde_json::Value> =
            serde_json::from_slice(payload.body()).expect("unload payload is a JSON array");
        let events = records
            .iter()
            .map(|r| r["event"]["type"].as_str().unwrap_or_default().to_string())
            .collect();
        self.payloads.lock().push(events);
    }

    fn kind(&self) -> UnloadStrategyKind {
        self.kind
    }
}

pub fn event_types(records: &[EventRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.event().event_type().to_string())
        .collect()
}

pub fn context() -> SourceContext {
    SourceContext::with_session_id("test-session", "0.1.0")
}

pub fn record(event_type: &str) -> EventRecord {
    EventRecord::builder(&context(), event_type).build()
}

pub fn names(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}{i}")).collect()
}

pub struct Harness {
    pub coordinator: DeliveryCoordinator,
    pub transport: Arc<RecordingTransport>,
    pub unload: Arc<RecordingUnload>,
}

impl Harness {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_transport(config, RecordingTransport::new())
    }

    pub fn with_transport(config: CoordinatorConfig, transport: RecordingTransport) -> Self {
        let transport = Arc::new(transport);
        let unload = Arc::new(RecordingUnload::new());
        let coordinator = DeliveryCoordinator::new(config, transport.clone(), unload.clone())
            .expect("coordinator inside runtime");
        Self {
            coordinator,
            transport,
            unload,
        }
    }

    pub fn enqueue_all<S: AsRef<str>>(&self, event_types: &[S]) {
        for event_type in event_types {
            self.coordinator.enqueue(record(event_type.as_ref()));
        }
    }

    pub fn pending(&self) -> Vec<String> {
        event_types(&self.coordinator.pending_records())
    }
}

/// Batch size 10 with a timer slow enough to stay out of the way.
pub fn manual_config() -> CoordinatorConfig {
    CoordinatorConfig {
        batch_size: 10,
        batch_interval: Duration::from_secs(3600),
        max_queue_len: None,
    }
}

/// Let spawned tasks run without moving a paused clock past any timer.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
