//! Domain layer for edgekite-agent.
//!
//! Contains the canonical types shared across all modules:
//! - `EventRecord`: the immutable telemetry envelope
//! - `SourceContext`: per-session producer identity
//! - `Severity`: event severity carried on the wire
//! - `AgentError`: top-level error type

pub mod error;
pub mod event_record;
pub mod severity;
pub mod source;

pub use error::AgentError;
pub use event_record::{EventDetails, EventRecord, EventRecordBuilder, Privacy, Source};
pub use severity::Severity;
pub use source::SourceContext;
