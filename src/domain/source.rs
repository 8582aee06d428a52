use super::event_record::Source;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Identity of the producing session, stamped into every record.
///
/// One context exists per page session. The session id is generated once
/// and held in memory; persisting it across reloads is the host's concern.
#[derive(Debug, Clone)]
pub struct SourceContext {
    session_id: String,
    version: String,
    metadata: Map<String, Value>,
}

impl SourceContext {
    pub fn new(version: impl Into<String>) -> Self {
        Self::with_session_id(Uuid::new_v4().to_string(), version)
    }

    pub fn with_session_id(session_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            version: version.into(),
            metadata: Map::new(),
        }
    }

    /// Attach opaque source metadata (viewport, locale, UTM parameters...).
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub(crate) fn to_source(&self) -> Source {
        Source::browser(
            self.session_id.clone(),
            self.version.clone(),
            self.metadata.clone(),
        )
    }
}
