use super::client::{ClientConfig, TransportError};
use super::serialization::{CONTENT_TYPE_JSON, Payload};
use super::transport::{UnloadStrategyKind, UnloadTransport};
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Largest body the beacon primitive accepts.
pub const DEFAULT_BEACON_MAX_PAYLOAD_BYTES: usize = 65_536;

const BEACON_THREAD_NAME: &str = "edgekite-beacon";
const BLOCKING_THREAD_NAME: &str = "edgekite-unload";
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct UnloadConfig {
    pub client: ClientConfig,
    pub beacon_enabled: bool,
    pub beacon_max_payload_bytes: usize,
}

impl Default for UnloadConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            beacon_enabled: true,
            beacon_max_payload_bytes: DEFAULT_BEACON_MAX_PAYLOAD_BYTES,
        }
    }
}

fn post_blocking(
    client: &reqwest::blocking::Client,
    url: &Url,
    payload: Payload,
) -> Result<u16, reqwest::Error> {
    let response = client
        .post(url.clone())
        .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
        .body(payload.into_body().to_vec())
        .send()?;
    Ok(response.status().as_u16())
}

/// Fire-and-forget hand-off to a dedicated delivery thread.
///
/// The worker owns its own blocking HTTP client and keeps draining queued
/// payloads after the coordinator is gone, so a send accepted here does not
/// depend on the caller staying alive.
pub struct BeaconTransport {
    sender: Mutex<Option<mpsc::Sender<Payload>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    max_payload_bytes: usize,
}

impl BeaconTransport {
    pub fn spawn(config: &ClientConfig, max_payload_bytes: usize) -> Result<Self, TransportError> {
        let url = config.batch_url()?;
        let client_config = config.clone();
        let (sender, receiver) = mpsc::channel::<Payload>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), TransportError>>(1);

        let worker = thread::Builder::new()
            .name(BEACON_THREAD_NAME.to_string())
            .spawn(move || beacon_worker(client_config, url, receiver, ready_tx))
            .map_err(|e| TransportError::WorkerSpawn(e.to_string()))?;

        // The worker owns the blocking client; the beacon only counts as
        // available once that client exists.
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(TransportError::WorkerSpawn(
                    "beacon worker exited during startup".to_string(),
                ));
            }
        }

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            max_payload_bytes,
        })
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Hand a payload to the worker. Returns `false` when the primitive
    /// refuses it: too large, or the worker is gone.
    pub fn queue(&self, payload: Payload) -> bool {
        if payload.len() > self.max_payload_bytes {
            return false;
        }

        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(payload).is_ok(),
            None => false,
        }
    }
}

fn beacon_worker(
    config: ClientConfig,
    url: Url,
    receiver: mpsc::Receiver<Payload>,
    ready: mpsc::SyncSender<Result<(), TransportError>>,
) {
    let client = match config.build_blocking() {
        Ok(client) => {
            let _ = ready.send(Ok(()));
            client
        }
        Err(e) => {
            warn!(error = %e, "Beacon worker could not build HTTP client");
            let _ = ready.send(Err(e));
            return;
        }
    };

    for payload in receiver {
        let records = payload.record_count();
        match post_blocking(&client, &url, payload) {
            Ok(status) => debug!(records, status, "Beacon delivered"),
            Err(e) => debug!(records, error = %e, "Beacon delivery failed"),
        }
    }
}

impl UnloadTransport for BeaconTransport {
    fn send_unload(&self, payload: Payload) {
        let records = payload.record_count();
        let bytes = payload.len();
        if !self.queue(payload) {
            debug!(records, bytes, "Beacon refused payload");
        }
    }

    fn kind(&self) -> UnloadStrategyKind {
        UnloadStrategyKind::Beacon
    }

    fn close(&self, grace: Duration) -> bool {
        // Dropping the sender lets the worker exit once its queue is empty.
        drop(self.sender.lock().take());

        let Some(worker) = self.worker.lock().take() else {
            return true;
        };

        let deadline = Instant::now() + grace;
        while !worker.is_finished() {
            if Instant::now() >= deadline {
                warn!(grace_ms = grace.as_millis() as u64, "Beacon worker still busy after grace period");
                return false;
            }
            thread::sleep(CLOSE_POLL_INTERVAL);
        }

        worker.join().is_ok()
    }
}

impl std::fmt::Debug for BeaconTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeaconTransport")
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("open", &self.sender.lock().is_some())
            .finish()
    }
}

/// Last-resort synchronous POST. Blocks the caller until the request
/// completes or times out.
#[derive(Debug, Clone)]
pub struct BlockingTransport {
    config: ClientConfig,
    url: Url,
}

impl BlockingTransport {
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let url = config.batch_url()?;
        Ok(Self { config, url })
    }

    /// Send `payload` and wait for the response status.
    ///
    /// Runs on a scoped helper thread so the blocking client never executes
    /// inside an async runtime context.
    pub fn send_blocking(&self, payload: Payload) -> Result<u16, TransportError> {
        thread::scope(|scope| {
            let handle = thread::Builder::new()
                .name(BLOCKING_THREAD_NAME.to_string())
                .spawn_scoped(scope, || {
                    let client = self.config.build_blocking()?;
                    post_blocking(&client, &self.url, payload).map_err(TransportError::from)
                })
                .map_err(|e| TransportError::WorkerSpawn(e.to_string()))?;

            handle
                .join()
                .map_err(|_| TransportError::WorkerSpawn("unload thread panicked".to_string()))?
        })
    }
}

impl UnloadTransport for BlockingTransport {
    fn send_unload(&self, payload: Payload) {
        let records = payload.record_count();
        match self.send_blocking(payload) {
            Ok(status) => debug!(records, status, "Blocking unload send completed"),
            Err(e) => debug!(records, error = %e, "Blocking unload send failed"),
        }
    }

    fn kind(&self) -> UnloadStrategyKind {
        UnloadStrategyKind::Blocking
    }
}

/// The unload strategy picked once for the lifetime of a session.
#[derive(Debug)]
pub enum UnloadStrategy {
    Beacon(BeaconTransport),
    Blocking(BlockingTransport),
}

impl UnloadStrategy {
    /// Capability detection: use the beacon when it is enabled and its
    /// worker starts, otherwise fall back to blocking sends.
    pub fn detect(config: &UnloadConfig) -> Result<Self, TransportError> {
        // Surface endpoint errors regardless of which strategy is chosen.
        config.client.batch_url()?;

        if config.beacon_enabled {
            match BeaconTransport::spawn(&config.client, config.beacon_max_payload_bytes) {
                Ok(beacon) => return Ok(UnloadStrategy::Beacon(beacon)),
                Err(e) => warn!(error = %e, "Beacon unavailable, using blocking unload sends"),
            }
        }

        Ok(UnloadStrategy::Blocking(BlockingTransport::new(
            config.client.clone(),
        )?))
    }
}

impl UnloadTransport for UnloadStrategy {
    fn send_unload(&self, payload: Payload) {
        match self {
            UnloadStrategy::Beacon(beacon) => beacon.send_unload(payload),
            UnloadStrategy::Blocking(blocking) => blocking.send_unload(payload),
        }
    }

    fn kind(&self) -> UnloadStrategyKind {
        match self {
            UnloadStrategy::Beacon(beacon) => beacon.kind(),
            UnloadStrategy::Blocking(blocking) => blocking.kind(),
        }
    }

    fn close(&self, grace: Duration) -> bool {
        match self {
            UnloadStrategy::Beacon(beacon) => beacon.close(grace),
            UnloadStrategy::Blocking(blocking) => blocking.close(grace),
        }
    }
}
