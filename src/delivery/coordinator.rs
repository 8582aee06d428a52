use super::state::{CoordinatorState, FlushOutcome};
use crate::buffer::{Batch, BatchScheduler, BatchTrigger, EventQueue};
use crate::domain::{AgentError, EventRecord};
use crate::sender::{
    BatchSerializer, DeliveryMetrics, DeliveryOutcome, DeliveryTransport, MetricsSnapshot,
    UnloadStrategyKind, UnloadTransport,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(2000);

/// Runtime settings of one coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub batch_size: usize,
    pub batch_interval: Duration,
    /// `None` keeps the queue unbounded.
    pub max_queue_len: Option<usize>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval: DEFAULT_BATCH_INTERVAL,
            max_queue_len: None,
        }
    }
}

struct Inner {
    config: CoordinatorConfig,
    queue: Mutex<EventQueue>,
    scheduler: BatchScheduler,
    transport: Arc<dyn DeliveryTransport>,
    unload: Arc<dyn UnloadTransport>,
    serializer: BatchSerializer,
    // Held for the whole take/send/requeue cycle of an async send.
    gate: tokio::sync::Mutex<()>,
    // Only written while the queue lock is held.
    torn_down: AtomicBool,
    sending: AtomicBool,
    size_flush_pending: AtomicBool,
    runtime: Handle,
    metrics: DeliveryMetrics,
}

/// Orchestrates the queue, the scheduler and both transports for one
/// session.
///
/// Cloning is cheap and every clone drives the same queue. Producers only
/// ever call [`enqueue`](Self::enqueue); delivery failures are recovered
/// here and never reach them.
#[derive(Clone)]
pub struct DeliveryCoordinator {
    inner: Arc<Inner>,
}

impl DeliveryCoordinator {
    /// Must be called from within a tokio runtime: the size trigger and the
    /// timer both spawn onto it.
    pub fn new(
        config: CoordinatorConfig,
        transport: Arc<dyn DeliveryTransport>,
        unload: Arc<dyn UnloadTransport>,
    ) -> Result<Self, AgentError> {
        let runtime = Handle::try_current().map_err(|e| AgentError::NoRuntime(e.to_string()))?;
        let scheduler = BatchScheduler::new(config.batch_size, config.batch_interval)?;

        debug!(
            batch_size = config.batch_size,
            batch_interval_ms = config.batch_interval.as_millis() as u64,
            max_queue_len = ?config.max_queue_len,
            unload_strategy = ?unload.kind(),
            "Delivery coordinator created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(EventQueue::with_limit(config.max_queue_len)),
                config,
                scheduler,
                transport,
                unload,
                serializer: BatchSerializer::new(),
                gate: tokio::sync::Mutex::new(()),
                torn_down: AtomicBool::new(false),
                sending: AtomicBool::new(false),
                size_flush_pending: AtomicBool::new(false),
                runtime,
                metrics: DeliveryMetrics::new(),
            }),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn state(&self) -> CoordinatorState {
        if self.inner.torn_down.load(Ordering::Acquire) {
            CoordinatorState::TornDown
        } else if self.inner.sending.load(Ordering::Acquire) {
            CoordinatorState::Sending
        } else if self.inner.queue.lock().is_empty() {
            CoordinatorState::Idle
        } else {
            CoordinatorState::Accumulating
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::Acquire)
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Copy of the pending records in send order.
    pub fn pending_records(&self) -> Vec<EventRecord> {
        self.inner.queue.lock().iter().cloned().collect()
    }

    pub fn timer_running(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    pub fn unload_strategy(&self) -> UnloadStrategyKind {
        self.inner.unload.kind()
    }

    pub fn metrics(&self) -> &DeliveryMetrics {
        &self.inner.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Append a record and evaluate the size trigger.
    ///
    /// Never fails. After teardown, or when a bounded queue is full, the
    /// record is dropped and counted.
    pub fn enqueue(&self, record: EventRecord) {
        let queue_len = {
            let mut queue = self.inner.queue.lock();
            if self.inner.torn_down.load(Ordering::Acquire) {
                drop(queue);
                self.inner.metrics.record_dropped();
                debug!(event_type = record.event().event_type(), "Dropped event after teardown");
                return;
            }
            match queue.enqueue(record) {
                Ok(len) => len,
                Err(e) => {
                    drop(queue);
                    self.inner.metrics.record_dropped();
                    warn!(error = %e, "Dropped event");
                    return;
                }
            }
        };

        self.inner.metrics.record_enqueued();
        debug!(queue_len, "Queued event");

        self.ensure_timer();
        if self.inner.scheduler.size_trigger_reached(queue_len) {
            self.request_size_flush();
        }
    }

    /// Send one batch of at most `batch_size` records now.
    ///
    /// Waits for any send already in flight, so consecutive flushes observe
    /// each other's requeues.
    pub async fn flush(&self) -> FlushOutcome {
        if self.is_torn_down() {
            return FlushOutcome::TornDown;
        }
        let _gate = self.inner.gate.lock().await;
        self.flush_locked(BatchTrigger::Manual).await
    }

    /// Timer entry point. Same as [`flush`](Self::flush), except that a tick
    /// arriving while a send is in flight is skipped instead of queued.
    pub async fn on_timer_tick(&self) -> FlushOutcome {
        let Ok(_gate) = self.inner.gate.try_lock() else {
            debug!("Timer tick skipped, send in flight");
            return FlushOutcome::InFlight;
        };
        self.flush_locked(BatchTrigger::Timer).await
    }

    /// Drain the whole queue through the unload-safe transport.
    ///
    /// Synchronous so it can run from any teardown signal. The first call
    /// moves the coordinator to `TornDown`; later calls are no-ops. Returns
    /// the number of records handed off.
    pub fn teardown_flush(&self) -> usize {
        self.teardown(None)
    }

    /// Teardown with a final record appended behind everything pending.
    /// The size trigger is not evaluated for it.
    pub fn teardown_flush_with(&self, record: EventRecord) -> usize {
        self.teardown(Some(record))
    }

    /// Stop the timer and give the unload transport up to `grace` to finish
    /// pending hand-offs. Returns `true` when nothing was left outstanding.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.inner.scheduler.stop();
        let unload = self.inner.unload.clone();

        match tokio::task::spawn_blocking(move || unload.close(grace)).await {
            Ok(closed) => closed,
            Err(e) => {
                warn!(error = %e, "Unload transport close task failed");
                false
            }
        }
    }

    fn teardown(&self, last: Option<EventRecord>) -> usize {
        let records = {
            let mut queue = self.inner.queue.lock();
            if self.inner.torn_down.swap(true, Ordering::AcqRel) {
                drop(queue);
                if last.is_some() {
                    self.inner.metrics.record_dropped();
                }
                debug!("Teardown flush already performed");
                return 0;
            }
            if let Some(record) = last {
                match queue.enqueue(record) {
                    Ok(_) => self.inner.metrics.record_enqueued(),
                    Err(e) => {
                        self.inner.metrics.record_dropped();
                        warn!(error = %e, "Dropped final event");
                    }
                }
            }
            queue.drain_all()
        };

        self.inner.scheduler.stop();

        if records.is_empty() {
            debug!("Teardown flush with empty queue");
            return 0;
        }
        self.hand_off(records)
    }

    /// One unload-safe send. No outcome is observed.
    fn hand_off(&self, records: Vec<EventRecord>) -> usize {
        let count = records.len();
        match self.inner.serializer.serialize_json_array(&records) {
            Ok(payload) => {
                debug!(
                    records = count,
                    bytes = payload.len(),
                    strategy = ?self.inner.unload.kind(),
                    "Teardown flush"
                );
                self.inner.unload.send_unload(payload);
                self.inner.metrics.record_teardown(count);
                count
            }
            Err(e) => {
                self.inner.metrics.record_discarded(count);
                error!(records = count, error = %e, "Teardown payload could not be serialized");
                0
            }
        }
    }

    fn ensure_timer(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.scheduler.start(&self.inner.runtime, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    DeliveryCoordinator { inner }.on_timer_tick().await;
                }
            }
        });
    }

    fn request_size_flush(&self) {
        if self.inner.size_flush_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let coordinator = self.clone();
        self.inner.runtime.spawn(async move {
            coordinator.drain_full_batches().await;
        });
    }

    async fn drain_full_batches(&self) {
        let _gate = self.inner.gate.lock().await;
        self.inner.size_flush_pending.store(false, Ordering::Release);

        loop {
            let records = {
                let mut queue = self.inner.queue.lock();
                if self.inner.torn_down.load(Ordering::Acquire)
                    || queue.len() < self.inner.config.batch_size
                {
                    break;
                }
                queue.take_batch(self.inner.config.batch_size)
            };

            let outcome = self.send(Batch::new(records, BatchTrigger::Size)).await;
            if !matches!(outcome, FlushOutcome::Delivered { .. }) {
                break;
            }
        }
    }

    // Caller holds the gate.
    async fn flush_locked(&self, trigger: BatchTrigger) -> FlushOutcome {
        let records = {
            let mut queue = self.inner.queue.lock();
            if self.inner.torn_down.load(Ordering::Acquire) {
                return FlushOutcome::TornDown;
            }
            queue.take_batch(self.inner.config.batch_size)
        };

        if records.is_empty() {
            return FlushOutcome::Empty;
        }
        self.send(Batch::new(records, trigger)).await
    }

    // Caller holds the gate.
    async fn send(&self, batch: Batch) -> FlushOutcome {
        let records = batch.len();
        debug!(
            batch_id = %batch.id(),
            records,
            trigger = %batch.trigger(),
            "Sending batch"
        );

        self.inner.sending.store(true, Ordering::Release);
        let start = Instant::now();
        let outcome = self.inner.transport.deliver(&batch).await;
        let latency = start.elapsed();
        self.inner.sending.store(false, Ordering::Release);

        match outcome {
            DeliveryOutcome::Delivered { status } => {
                self.inner.metrics.record_delivered(records, latency);
                debug!(batch_id = %batch.id(), records, status, "Batch delivered");
                FlushOutcome::Delivered { records }
            }
            DeliveryOutcome::Failed { reason } if reason.is_retryable() => {
                let mut queue = self.inner.queue.lock();
                if self.inner.torn_down.load(Ordering::Acquire) {
                    drop(queue);
                    // Teardown already drained the queue; this batch gets
                    // its own unload-safe attempt.
                    warn!(batch_id = %batch.id(), %reason, "Batch failed after teardown");
                    self.hand_off_late(batch.into_records());
                    return FlushOutcome::TornDown;
                }
                queue.requeue_front(batch.into_records());
                drop(queue);

                self.inner.metrics.record_requeued(records, latency);
                warn!(records, %reason, "Batch failed and re-queued");
                FlushOutcome::Requeued { records, reason }
            }
            DeliveryOutcome::Failed { reason } => {
                self.inner.metrics.record_discarded(records);
                error!(batch_id = %batch.id(), records, %reason, "Batch dropped");
                FlushOutcome::Discarded { records, reason }
            }
        }
    }

    fn hand_off_late(&self, records: Vec<EventRecord>) {
        let coordinator = self.clone();
        // The blocking strategy must not stall a runtime worker.
        self.inner.runtime.spawn_blocking(move || {
            coordinator.hand_off(records);
        });
    }
}

impl std::fmt::Debug for DeliveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryCoordinator")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .field("queue_len", &self.queue_len())
            .finish()
    }
}
