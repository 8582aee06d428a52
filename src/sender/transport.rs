use super::serialization::Payload;
use crate::buffer::Batch;
use futures::future::BoxFuture;
use std::fmt;
use std::time::Duration;

/// Why an asynchronous delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Collector answered outside [200, 300).
    HttpStatus(u16),
    /// Connection, DNS, TLS or body-level failure.
    Network(String),
    /// The request did not complete within the configured timeout.
    Timeout,
    /// The batch could not be encoded. A producer contract breach: retrying
    /// the same records cannot succeed.
    Serialization(String),
}

impl FailureReason {
    /// Retryable failures are requeued at the head of the queue.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureReason::Serialization(_))
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::HttpStatus(status) => write!(f, "HTTP {status}"),
            FailureReason::Network(message) => write!(f, "network error: {message}"),
            FailureReason::Timeout => f.write_str("request timed out"),
            FailureReason::Serialization(message) => write!(f, "serialization failed: {message}"),
        }
    }
}

/// Result of one asynchronous delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { status: u16 },
    Failed { reason: FailureReason },
}

impl DeliveryOutcome {
    pub fn failed(reason: FailureReason) -> Self {
        DeliveryOutcome::Failed { reason }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Asynchronous best-effort send used during normal operation.
///
/// Implementations are stateless with respect to retries: they report the
/// outcome and the coordinator owns requeueing.
pub trait DeliveryTransport: Send + Sync {
    fn deliver<'a>(&'a self, batch: &'a Batch) -> BoxFuture<'a, DeliveryOutcome>;
}

/// Which unload strategy was selected at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadStrategyKind {
    /// Hand-off to a delivery worker that outlives the session.
    Beacon,
    /// Synchronous POST; blocks the caller until it completes.
    Blocking,
}

/// Unload-safe best-effort send used only by teardown.
///
/// Fire-and-forget: no outcome is returned and the caller must not rely on
/// anything completing after `send_unload` returns.
#[cfg_attr(test, mockall::automock)]
pub trait UnloadTransport: Send + Sync {
    fn send_unload(&self, payload: Payload);

    fn kind(&self) -> UnloadStrategyKind;

    /// Give pending hand-offs up to `grace` to finish. Returns `true` when
    /// nothing is left outstanding.
    fn close(&self, _grace: Duration) -> bool {
        true
    }
}
