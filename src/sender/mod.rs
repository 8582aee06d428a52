//! Network side of delivery: the async batch transport, the unload-safe
//! strategies used at teardown, and delivery counters.
pub mod client;
pub mod http;
pub mod metrics;
pub mod serialization;
pub mod transport;
pub mod unload;

pub use client::{ClientConfig, HttpClient, TransportError};
pub use http::HttpTransport;
pub use metrics::{DeliveryMetrics, MetricsSnapshot};
pub use serialization::{BatchSerializer, CONTENT_TYPE_JSON, Payload, SerializationError};
pub use transport::{
    DeliveryOutcome, DeliveryTransport, FailureReason, UnloadStrategyKind, UnloadTransport,
};
pub use unload::{
    BeaconTransport, BlockingTransport, DEFAULT_BEACON_MAX_PAYLOAD_BYTES, UnloadConfig,
    UnloadStrategy,
};

#[cfg(test)]
pub use transport::MockUnloadTransport;
