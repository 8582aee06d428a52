use super::client::{ClientConfig, HttpClient, TransportError};
use super::serialization::{BatchSerializer, CONTENT_TYPE_JSON};
use super::transport::{DeliveryOutcome, DeliveryTransport, FailureReason};
use crate::buffer::Batch;
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Asynchronous transport: POSTs each batch as a JSON array.
///
/// Any 2xx is a delivery. Everything else is reported as a failure and left
/// to the coordinator.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    serializer: BatchSerializer,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        Ok(Self::from_client(HttpClient::new(config)?))
    }

    pub fn from_client(client: HttpClient) -> Self {
        Self {
            client,
            serializer: BatchSerializer::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.client.batch_url().as_str()
    }

    async fn post_batch(&self, batch: &Batch) -> DeliveryOutcome {
        let payload = match self.serializer.serialize_json_array(batch.records()) {
            Ok(payload) => payload,
            Err(e) => return DeliveryOutcome::failed(FailureReason::Serialization(e.to_string())),
        };
        let bytes_sent = payload.len();
        let start = Instant::now();

        let request = self
            .client
            .client()
            .post(self.client.batch_url().clone())
            .header(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON))
            .body(payload.into_body())
            .send();

        let response = match timeout(self.client.timeout(), request).await {
            Err(_) => return DeliveryOutcome::failed(FailureReason::Timeout),
            Ok(Err(e)) if e.is_timeout() => return DeliveryOutcome::failed(FailureReason::Timeout),
            Ok(Err(e)) => return DeliveryOutcome::failed(FailureReason::Network(e.to_string())),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if status.is_success() {
            debug!(
                batch_id = %batch.id(),
                records = batch.len(),
                bytes = bytes_sent,
                status = status.as_u16(),
                latency_ms = start.elapsed().as_millis() as u64,
                "Batch accepted by collector"
            );
            DeliveryOutcome::Delivered {
                status: status.as_u16(),
            }
        } else {
            warn!(
                batch_id = %batch.id(),
                status = status.as_u16(),
                "Collector rejected batch"
            );
            DeliveryOutcome::failed(FailureReason::HttpStatus(status.as_u16()))
        }
    }
}

impl DeliveryTransport for HttpTransport {
    fn deliver<'a>(&'a self, batch: &'a Batch) -> BoxFuture<'a, DeliveryOutcome> {
        self.post_batch(batch).boxed()
    }
}
