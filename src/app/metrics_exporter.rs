use super::config::MetricsConfig;
use crate::sender::{DeliveryMetrics, MetricsSnapshot};
use parking_lot::Mutex;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;
use thiserror::Error;
use warp::{Filter, Reply};

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),
    #[error("Metrics encoding error: {0}")]
    EncodingError(String),
}

type Reader = fn(&MetricsSnapshot) -> u64;

fn counter_table() -> [(&'static str, &'static str, Reader); 9] {
    [
        (
            "edgekite_records_enqueued_total",
            "Records accepted into the queue",
            |s| s.enqueued,
        ),
        (
            "edgekite_records_dropped_total",
            "Records dropped at enqueue",
            |s| s.dropped,
        ),
        (
            "edgekite_batches_delivered_total",
            "Batches acknowledged with a 2xx",
            |s| s.batches_delivered,
        ),
        (
            "edgekite_batches_failed_total",
            "Batch delivery attempts that failed",
            |s| s.batches_failed,
        ),
        (
            "edgekite_records_delivered_total",
            "Records acknowledged by the collector",
            |s| s.records_delivered,
        ),
        (
            "edgekite_records_requeued_total",
            "Records put back at the queue head",
            |s| s.records_requeued,
        ),
        (
            "edgekite_records_discarded_total",
            "Records dropped after a terminal failure",
            |s| s.records_discarded,
        ),
        (
            "edgekite_teardown_flushes_total",
            "Unload-safe sends performed",
            |s| s.teardown_flushes,
        ),
        (
            "edgekite_teardown_records_total",
            "Records handed to the unload-safe path",
            |s| s.teardown_records,
        ),
    ]
}

/// Serves delivery counters in the Prometheus text format.
///
/// Values are copied from the shared [`DeliveryMetrics`] on every scrape, so
/// the delivery path never touches the registry.
#[derive(Clone)]
pub struct PrometheusExporter {
    config: MetricsConfig,
    registry: Arc<Registry>,
    // Locked for the whole catch-up so concurrent scrapes never add a delta twice.
    counters: Arc<Mutex<Vec<(IntCounter, Reader)>>>,
    last_latency: IntGauge,
    metrics: DeliveryMetrics,
}

impl PrometheusExporter {
    pub fn new(config: MetricsConfig, metrics: DeliveryMetrics) -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let table = counter_table();
        let mut counters = Vec::with_capacity(table.len());

        for (name, help, reader) in table {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            counters.push((counter, reader));
        }

        let last_latency = IntGauge::new(
            "edgekite_last_send_latency_microseconds",
            "Latency of the most recent batch send",
        )?;
        registry.register(Box::new(last_latency.clone()))?;

        Ok(Self {
            config,
            registry: Arc::new(registry),
            counters: Arc::new(Mutex::new(counters)),
            last_latency,
            metrics,
        })
    }

    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let snapshot = self.metrics.snapshot();
        {
            let counters = self.counters.lock();
            for (counter, reader) in counters.iter() {
                let delta = reader(&snapshot).saturating_sub(counter.get());
                if delta > 0 {
                    counter.inc_by(delta);
                }
            }
        }
        self.last_latency
            .set(i64::try_from(snapshot.last_latency.as_micros()).unwrap_or(i64::MAX));

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }

    pub async fn start_server(&self) -> Result<(), MetricsError> {
        if !self.config.enabled {
            return Ok(());
        }

        let exporter = self.clone();
        let metrics = warp::path!("metrics")
            .and(warp::get())
            .map(move || match exporter.export_metrics() {
                Ok(metrics_text) => warp::reply::with_header(
                    metrics_text,
                    "content-type",
                    "text/plain; version=0.0.4",
                )
                .into_response(),
                Err(_) => warp::reply::with_status(
                    "Internal Server Error",
                    warp::http::StatusCode::INTERNAL_SERVER_ERROR,
                )
                .into_response(),
            });

        let health = warp::path!("health").and(warp::get()).map(|| "OK");

        tracing::info!(port = self.config.port, "Starting Prometheus metrics server");

        warp::serve(metrics.or(health))
            .run(([0, 0, 0, 0], self.config.port))
            .await;

        Ok(())
    }
}
