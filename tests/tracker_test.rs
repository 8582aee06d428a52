mod common;

use common::{Harness, RecordingTransport, context, manual_config};
use edgekite_agent::delivery::FlushOutcome;
use edgekite_agent::sender::FailureReason;
use edgekite_agent::tracker::{MAX_ERROR_MESSAGE_CHARS, Tracker};
use serde_json::{Map, json};

fn data(value: serde_json::Value) -> Map<String, serde_json::Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_tracked_events_are_delivered_on_flush() {
    let harness = Harness::new(manual_config());
    let tracker = Tracker::new(harness.coordinator.clone(), context());

    tracker.track("page_view", data(json!({"path": "/pricing"})), None);
    tracker.track("signup", Map::new(), Some("conversion"));
    tracker.track_error(&"e".repeat(300), None, Some(1), Some(2));

    assert_eq!(tracker.flush().await, FlushOutcome::Delivered { records: 3 });
    assert_eq!(
        harness.transport.delivered_events(),
        vec!["page_view", "signup", "error"]
    );
}

#[tokio::test]
async fn test_track_leave_carries_failed_batch_and_leave_record() {
    let harness = Harness::with_transport(manual_config(), RecordingTransport::new());
    let tracker = Tracker::new(harness.coordinator.clone(), context());
    harness.transport.fail_next(FailureReason::HttpStatus(503));

    tracker.track("a", Map::new(), None);
    tracker.track("b", Map::new(), None);
    assert!(matches!(tracker.flush().await, FlushOutcome::Requeued { .. }));

    let handed_off = tracker.track_leave(data(json!({"time_on_page_ms": 1200})));

    assert_eq!(handed_off, 3);
    assert_eq!(harness.unload.payloads(), vec![vec!["a", "b", "page_leave"]]);
}

#[tokio::test]
async fn test_tracking_after_leave_is_ignored() {
    let harness = Harness::new(manual_config());
    let tracker = Tracker::new(harness.coordinator.clone(), context());

    assert_eq!(tracker.track_leave(Map::new()), 1);
    tracker.track("late", Map::new(), None);
    tracker.track_error("late error", None, None, None);

    assert!(harness.pending().is_empty());
    assert_eq!(tracker.track_leave(Map::new()), 0);
    assert_eq!(harness.unload.send_count(), 1);
    assert_eq!(harness.coordinator.metrics_snapshot().dropped, 3);
}

#[tokio::test]
async fn test_error_message_is_bounded() {
    let harness = Harness::new(manual_config());
    let tracker = Tracker::new(harness.coordinator.clone(), context());

    tracker.track_error(
        &"é".repeat(MAX_ERROR_MESSAGE_CHARS + 50),
        Some("app.js"),
        Some(3),
        None,
    );

    let pending = harness.coordinator.pending_records();
    let message = pending[0].event().data()["message"].as_str().unwrap();
    assert_eq!(message.chars().count(), MAX_ERROR_MESSAGE_CHARS);
    assert_eq!(pending[0].event().data()["filename"], "app.js");
    assert_eq!(pending[0].event().data()["lineno"], 3);
    assert!(pending[0].event().data()["colno"].is_null());
}
