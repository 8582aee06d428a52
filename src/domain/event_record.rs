use super::severity::Severity;
use super::source::SourceContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SOURCE_TYPE_BROWSER: &str = "browser";
pub const DEFAULT_CATEGORY: &str = "web";
pub const DEFAULT_RETENTION_CLASS: &str = "standard";

/// Who produced the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    source_type: String,
    id: String,
    version: String,
    /// Opaque producer metadata; never inspected by the delivery core.
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl Source {
    pub(crate) fn browser(id: String, version: String, metadata: Map<String, Value>) -> Self {
        Self {
            source_type: SOURCE_TYPE_BROWSER.to_string(),
            id,
            version,
            metadata,
        }
    }

    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    category: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    data: Map<String, Value>,
}

impl EventDetails {
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Privacy {
    #[serde(default)]
    pii: bool,
    #[serde(default = "default_retention_class")]
    retention_class: String,
}

fn default_retention_class() -> String {
    DEFAULT_RETENTION_CLASS.to_string()
}

impl Default for Privacy {
    fn default() -> Self {
        Self {
            pii: false,
            retention_class: default_retention_class(),
        }
    }
}

impl Privacy {
    pub fn pii(&self) -> bool {
        self.pii
    }

    pub fn retention_class(&self) -> &str {
        &self.retention_class
    }
}

/// The envelope every signal producer hands to the delivery core.
///
/// Immutable once built: fields are private and only readable. The queue
/// reorders and removes records but never touches their contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    observed_at: DateTime<Utc>,
    source: Source,
    event: EventDetails,
    #[serde(default)]
    privacy: Privacy,
}

impl EventRecord {
    /// Start building a record of `event_type` for the given session.
    pub fn builder(context: &SourceContext, event_type: impl Into<String>) -> EventRecordBuilder {
        EventRecordBuilder {
            source: context.to_source(),
            category: DEFAULT_CATEGORY.to_string(),
            event_type: event_type.into(),
            severity: Severity::default(),
            data: Map::new(),
        }
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn event(&self) -> &EventDetails {
        &self.event
    }

    pub fn privacy(&self) -> &Privacy {
        &self.privacy
    }
}

#[derive(Debug, Clone)]
pub struct EventRecordBuilder {
    source: Source,
    category: String,
    event_type: String,
    severity: Severity,
    data: Map<String, Value>,
}

impl EventRecordBuilder {
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Insert a single data field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Finish the record. `observed_at` is stamped here, at construction.
    pub fn build(self) -> EventRecord {
        EventRecord {
            observed_at: Utc::now(),
            source: self.source,
            event: EventDetails {
                category: self.category,
                event_type: self.event_type,
                severity: self.severity,
                data: self.data,
            },
            privacy: Privacy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> SourceContext {
        SourceContext::with_session_id("session-abc", "0.1.0")
    }

    #[test]
    fn test_builder_applies_defaults() {
        let record = EventRecord::builder(&context(), "page_view").build();

        assert_eq!(record.event().category(), "web");
        assert_eq!(record.event().event_type(), "page_view");
        assert_eq!(record.event().severity(), Severity::Info);
        assert!(record.event().data().is_empty());
        assert!(!record.privacy().pii());
        assert_eq!(record.privacy().retention_class(), "standard");
        assert_eq!(record.source().source_type(), "browser");
        assert_eq!(record.source().id(), "session-abc");
    }

    #[test]
    fn test_observed_at_is_stamped_at_build() {
        let before = Utc::now();
        let record = EventRecord::builder(&context(), "click").build();
        let after = Utc::now();

        assert!(record.observed_at() >= before);
        assert!(record.observed_at() <= after);
    }

    #[test]
    fn test_wire_shape_uses_snake_case_and_type_keys() {
        let record = EventRecord::builder(&context(), "error")
            .severity(Severity::Error)
            .field("message", "boom")
            .build();

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["source"]["type"], "browser");
        assert_eq!(value["source"]["id"], "session-abc");
        assert_eq!(value["source"]["version"], "0.1.0");
        assert_eq!(value["event"]["type"], "error");
        assert_eq!(value["event"]["category"], "web");
        assert_eq!(value["event"]["severity"], "error");
        assert_eq!(value["event"]["data"]["message"], "boom");
        assert_eq!(value["privacy"]["pii"], false);
        assert_eq!(value["privacy"]["retention_class"], "standard");
        assert!(value["observed_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_deserialize_fills_optional_defaults() {
        let raw = json!({
            "observed_at": "2024-05-01T12:00:00Z",
            "source": { "type": "browser", "id": "s1", "version": "0.1.0" },
            "event": { "category": "web", "type": "scroll" }
        });

        let record: EventRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.event().severity(), Severity::Info);
        assert!(record.event().data().is_empty());
        assert!(record.source().metadata().is_empty());
        assert_eq!(record.privacy(), &Privacy::default());
    }

    #[test]
    fn test_deserialize_rejects_missing_event() {
        let raw = json!({
            "observed_at": "2024-05-01T12:00:00Z",
            "source": { "type": "browser", "id": "s1", "version": "0.1.0" }
        });

        assert!(serde_json::from_value::<EventRecord>(raw).is_err());
    }
}
