use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("Queue is full: limit {limit} records")]
    QueueFull { limit: usize },

    #[error("Invalid batch size: {size}")]
    InvalidBatchSize { size: usize },

    #[error("Invalid batch interval: {interval_ms}ms")]
    InvalidInterval { interval_ms: u64 },
}

impl BufferError {
    /// Whether the caller can expect the same operation to succeed later.
    pub fn is_recoverable(&self) -> bool {
        match self {
            BufferError::QueueFull { .. } => true,
            BufferError::InvalidBatchSize { .. } | BufferError::InvalidInterval { .. } => false,
        }
    }
}
