use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const MAX_LATENCY_SAMPLES: usize = 1000;

fn calculate_percentile(sorted_samples: &[Duration], percentile: f64) -> Duration {
    if sorted_samples.is_empty() {
        return Duration::ZERO;
    }

    let percentile = percentile.clamp(0.0, 1.0);
    let last = sorted_samples.len() - 1;
    let index = ((percentile * last as f64).floor() as usize).min(last);

    sorted_samples.get(index).copied().unwrap_or(Duration::ZERO)
}

/// Point-in-time copy of the delivery counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub batches_delivered: u64,
    pub batches_failed: u64,
    pub records_delivered: u64,
    pub records_requeued: u64,
    pub records_discarded: u64,
    pub teardown_flushes: u64,
    pub teardown_records: u64,
    pub last_latency: Duration,
    pub p95_latency: Duration,
}

/// Lock-free delivery counters shared by every clone of a coordinator.
#[derive(Clone, Default)]
pub struct DeliveryMetrics {
    enqueued: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    batches_delivered: Arc<AtomicU64>,
    batches_failed: Arc<AtomicU64>,
    records_delivered: Arc<AtomicU64>,
    records_requeued: Arc<AtomicU64>,
    records_discarded: Arc<AtomicU64>,
    teardown_flushes: Arc<AtomicU64>,
    teardown_records: Arc<AtomicU64>,
    last_latency_us: Arc<AtomicU64>,
    latency_samples: Arc<Mutex<VecDeque<Duration>>>,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, records: usize, latency: Duration) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.records_delivered
            .fetch_add(records as u64, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// A failed attempt whose records went back to the queue head.
    pub fn record_requeued(&self, records: usize, latency: Duration) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.records_requeued
            .fetch_add(records as u64, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// A failed attempt whose records were dropped for good.
    pub fn record_discarded(&self, records: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.records_discarded
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn record_teardown(&self, records: usize) {
        self.teardown_flushes.fetch_add(1, Ordering::Relaxed);
        self.teardown_records
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    fn record_latency(&self, latency: Duration) {
        self.last_latency_us
            .store(latency.as_micros() as u64, Ordering::Relaxed);

        let mut samples = self.latency_samples.lock();
        if samples.len() == MAX_LATENCY_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(latency);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let p95_latency = {
            let mut sorted: Vec<Duration> = self.latency_samples.lock().iter().copied().collect();
            sorted.sort_unstable();
            calculate_percentile(&sorted, 0.95)
        };

        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            records_requeued: self.records_requeued.load(Ordering::Relaxed),
            records_discarded: self.records_discarded.load(Ordering::Relaxed),
            teardown_flushes: self.teardown_flushes.load(Ordering::Relaxed),
            teardown_records: self.teardown_records.load(Ordering::Relaxed),
            last_latency: Duration::from_micros(self.last_latency_us.load(Ordering::Relaxed)),
            p95_latency,
        }
    }
}

impl std::fmt::Debug for DeliveryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DeliveryMetrics").field(&self.snapshot()).finish()
    }
}
