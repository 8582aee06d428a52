use thiserror::Error;

/// Top-level error type for building and running the agent.
///
/// Delivery failures never show up here: they are recovered inside the
/// coordinator and only logged.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::app::ConfigError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] crate::buffer::BufferError),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::sender::TransportError),

    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    #[error("Logging initialization failed: {0}")]
    Logging(#[from] crate::app::InitializationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
