use crate::domain::EventRecord;
use bytes::Bytes;
use thiserror::Error;

/// Content type of every delivery body, batch or teardown.
pub const CONTENT_TYPE_JSON: &str = "application/json";

// Pre-size the buffer; a typical browser record serializes to roughly this.
const ESTIMATED_RECORD_SIZE: usize = 384;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Batch is empty")]
    EmptyBatch,
}

/// A serialized delivery body: a JSON array of records.
#[derive(Debug, Clone)]
pub struct Payload {
    body: Bytes,
    record_count: usize,
}

impl Payload {
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Body size in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchSerializer;

impl BatchSerializer {
    pub fn new() -> Self {
        Self
    }

    pub fn serialize_json_array(
        &self,
        records: &[EventRecord],
    ) -> Result<Payload, SerializationError> {
        if records.is_empty() {
            return Err(SerializationError::EmptyBatch);
        }

        let mut buffer = Vec::with_capacity(records.len().saturating_mul(ESTIMATED_RECORD_SIZE));
        serde_json::to_writer(&mut buffer, records)?;

        Ok(Payload {
            body: Bytes::from(buffer),
            record_count: records.len(),
        })
    }
}
