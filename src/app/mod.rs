pub mod config;
pub mod ingress;
pub mod initialization;
pub mod logging_system;
#[cfg(feature = "metrics")]
pub mod metrics_exporter;
pub mod shutdown;

pub use config::{Config, ConfigError, LogFormat, LogLevel, MetricsConfig};
pub use ingress::{IngressLine, IngressStats, TrackCommand, pump};
pub use initialization::{InitializationError, LogDirective};
pub use logging_system::{LoggingSystem, setup_logging};
pub use shutdown::{TeardownSignal, wait_for_signal};

use crate::delivery::DeliveryCoordinator;
use crate::domain::{AgentError, SourceContext};
use crate::sender::{HttpTransport, MetricsSnapshot, UnloadStrategy};
use crate::tracker::Tracker;
use anyhow::Context;
use std::sync::Arc;
use tokio::io::AsyncBufRead;
use tracing::{error, info, warn};

/// How a session ended.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub signal: TeardownSignal,
    pub handed_off: usize,
    /// Every teardown send finished within the grace period.
    pub drained: bool,
    pub metrics: MetricsSnapshot,
}

pub struct App {
    config: Config,
    tracker: Tracker,
}

impl App {
    pub fn from_args<I, T>(args: I) -> Result<Self, AgentError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::load(args)?;
        Self::from_config(config)
    }

    /// Wire transports, coordinator and tracker. Must run inside a tokio
    /// runtime.
    pub fn from_config(config: Config) -> Result<Self, AgentError> {
        let transport = Arc::new(HttpTransport::new(config.client_config())?);
        let unload = Arc::new(UnloadStrategy::detect(&config.unload_config())?);
        let coordinator =
            DeliveryCoordinator::new(config.coordinator_config(), transport, unload)?;
        let tracker = Tracker::new(coordinator, SourceContext::new(crate::VERSION));

        Ok(Self { config, tracker })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Pump `input` until it ends or a teardown signal arrives, then run the
    /// teardown flush and wait for it within the grace period.
    pub async fn run<R>(self, input: R) -> Result<RunSummary, AgentError>
    where
        R: AsyncBufRead + Unpin,
    {
        let coordinator = self.tracker.coordinator().clone();
        info!(
            version = crate::VERSION,
            session_id = self.tracker.session_id(),
            batch_endpoint = %self.config.resolved_batch_endpoint,
            batch_size = self.config.batch_size,
            unload_strategy = ?coordinator.unload_strategy(),
            "Starting edgekite-agent"
        );

        self.spawn_metrics_server();

        let ended: std::io::Result<TeardownSignal> = tokio::select! {
            result = pump(input, &self.tracker) => result.map(|stats| {
                info!(
                    lines = stats.lines,
                    records = stats.records,
                    tracked = stats.tracked,
                    skipped = stats.skipped,
                    "Ingress finished"
                );
                if stats.left {
                    TeardownSignal::PageLeave
                } else {
                    TeardownSignal::EndOfInput
                }
            }),
            result = wait_for_signal() => result,
        };

        // Every exit path flushes, including a failed read or signal
        // handler. A page_leave already performed the teardown flush; this
        // is then a no-op.
        let handed_off = coordinator.teardown_flush();
        let drained = coordinator.shutdown(self.config.teardown_grace).await;
        if !drained {
            warn!(
                grace_ms = self.config.teardown_grace_ms,
                "Teardown sends still pending at exit"
            );
        }

        let signal = ended.map_err(|e| {
            error!(error = %e, handed_off, "Session ended with an error after teardown");
            AgentError::from(e)
        })?;

        Ok(RunSummary {
            signal,
            handed_off,
            drained,
            metrics: coordinator.metrics_snapshot(),
        })
    }

    #[cfg(feature = "metrics")]
    fn spawn_metrics_server(&self) {
        if !self.config.metrics_config.enabled {
            return;
        }

        match metrics_exporter::PrometheusExporter::new(
            self.config.metrics_config.clone(),
            self.tracker.coordinator().metrics().clone(),
        ) {
            Ok(exporter) => {
                tokio::spawn(async move {
                    if let Err(e) = exporter.start_server().await {
                        warn!(error = %e, "Metrics server stopped");
                    }
                });
            }
            Err(e) => warn!(error = %e, "Metrics exporter unavailable"),
        }
    }

    #[cfg(not(feature = "metrics"))]
    fn spawn_metrics_server(&self) {
        if self.config.metrics_config.enabled {
            warn!("Metrics requested but the metrics feature is disabled");
        }
    }
}

// Main entry point for the application
pub async fn main() -> anyhow::Result<()> {
    let config = Config::load(std::env::args_os()).context("Failed to load configuration")?;

    // Delivery must keep working even when diagnostics cannot be installed.
    if let Err(e) = setup_logging(&config) {
        eprintln!("Warning: {e}, continuing without diagnostics");
    }

    let app = App::from_config(config).context("Failed to start delivery")?;
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let summary = app.run(stdin).await?;

    info!(
        signal = %summary.signal,
        handed_off = summary.handed_off,
        delivered = summary.metrics.records_delivered,
        dropped = summary.metrics.dropped,
        "edgekite-agent stopped"
    );
    Ok(())
}
