//! Producer-side convenience API over a [`DeliveryCoordinator`].
use crate::delivery::{DeliveryCoordinator, FlushOutcome};
use crate::domain::{EventRecord, Severity, SourceContext};
use serde_json::{Map, Value};

pub const ERROR_EVENT_TYPE: &str = "error";
pub const PAGE_LEAVE_EVENT_TYPE: &str = "page_leave";
pub const MAX_ERROR_MESSAGE_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct Tracker {
    coordinator: DeliveryCoordinator,
    context: SourceContext,
}

impl Tracker {
    pub fn new(coordinator: DeliveryCoordinator, context: SourceContext) -> Self {
        Self {
            coordinator,
            context,
        }
    }

    pub fn session_id(&self) -> &str {
        self.context.session_id()
    }

    pub fn version(&self) -> &str {
        self.context.version()
    }

    pub fn context(&self) -> &SourceContext {
        &self.context
    }

    pub fn coordinator(&self) -> &DeliveryCoordinator {
        &self.coordinator
    }

    /// Record an event with severity `info`. `category` defaults to `web`.
    pub fn track(&self, event_type: &str, data: Map<String, Value>, category: Option<&str>) {
        self.track_with_severity(event_type, data, category, Severity::Info);
    }

    pub fn track_with_severity(
        &self,
        event_type: &str,
        data: Map<String, Value>,
        category: Option<&str>,
        severity: Severity,
    ) {
        let mut builder = EventRecord::builder(&self.context, event_type)
            .severity(severity)
            .data(data);
        if let Some(category) = category {
            builder = builder.category(category);
        }
        self.coordinator.enqueue(builder.build());
    }

    /// Record an uncaught error. Long messages are cut to 200 characters and
    /// a missing location is sent as `null`.
    pub fn track_error(
        &self,
        message: &str,
        filename: Option<&str>,
        lineno: Option<u32>,
        colno: Option<u32>,
    ) {
        let message: String = message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
        let record = EventRecord::builder(&self.context, ERROR_EVENT_TYPE)
            .severity(Severity::Error)
            .field("message", message)
            .field("filename", filename)
            .field("lineno", lineno)
            .field("colno", colno)
            .build();
        self.coordinator.enqueue(record);
    }

    /// Record the session end and tear down: the `page_leave` record rides
    /// the unload-safe send together with everything still queued.
    pub fn track_leave(&self, data: Map<String, Value>) -> usize {
        let record = EventRecord::builder(&self.context, PAGE_LEAVE_EVENT_TYPE)
            .data(data)
            .build();
        self.coordinator.teardown_flush_with(record)
    }

    pub async fn flush(&self) -> FlushOutcome {
        self.coordinator.flush().await
    }
}
