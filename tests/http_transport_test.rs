mod common;

use common::{RecordingUnload, event_types, manual_config, record};
use edgekite_agent::buffer::{Batch, BatchTrigger};
use edgekite_agent::delivery::{DeliveryCoordinator, FlushOutcome};
use edgekite_agent::sender::{
    ClientConfig, DeliveryOutcome, DeliveryTransport, FailureReason, HttpTransport,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

const BATCH_PATH: &str = "/api/events/batch";

fn transport_for(server: &MockServer) -> HttpTransport {
    let config = ClientConfig::with_endpoint(format!("{}{BATCH_PATH}", server.uri()))
        .with_timeout(Duration::from_secs(5));
    HttpTransport::new(config).unwrap()
}

fn batch(event_types: &[&str]) -> Batch {
    Batch::new(
        event_types.iter().map(|t| record(t)).collect(),
        BatchTrigger::Manual,
    )
}

#[tokio::test]
async fn test_2xx_is_delivered() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = transport_for(&mock_server);
    let outcome = transport.deliver(&batch(&["click", "scroll"])).await;

    assert_eq!(outcome, DeliveryOutcome::Delivered { status: 202 });
}

#[tokio::test]
async fn test_body_is_json_array_in_queue_order() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let transport = transport_for(&mock_server);
    transport.deliver(&batch(&["a", "b", "c"])).await;

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let records = body.as_array().expect("body is a JSON array");
    let types: Vec<&str> = records
        .iter()
        .map(|r| r["event"]["type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["a", "b", "c"]);
    assert_eq!(records[0]["source"]["id"], "test-session");
    assert!(records[0]["observed_at"].is_string());
}

#[tokio::test]
async fn test_server_error_is_reported_with_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let transport = transport_for(&mock_server);
    let outcome = transport.deliver(&batch(&["a"])).await;

    assert_eq!(outcome, DeliveryOutcome::failed(FailureReason::HttpStatus(500)));
}

#[tokio::test]
async fn test_client_error_is_a_failure_too() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&mock_server)
        .await;

    let transport = transport_for(&mock_server);
    let outcome = transport.deliver(&batch(&["a"])).await;

    // Retried like any other failure; only serialization errors are final.
    assert_eq!(outcome, DeliveryOutcome::failed(FailureReason::HttpStatus(400)));
    match outcome {
        DeliveryOutcome::Failed { reason } => assert!(reason.is_retryable()),
        other => panic!("Expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_collector_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&mock_server)
        .await;

    let config = ClientConfig::with_endpoint(format!("{}{BATCH_PATH}", mock_server.uri()))
        .with_timeout(Duration::from_millis(100));
    let transport = HttpTransport::new(config).unwrap();

    let outcome = transport.deliver(&batch(&["a"])).await;

    assert_eq!(outcome, DeliveryOutcome::failed(FailureReason::Timeout));
}

#[tokio::test]
async fn test_coordinator_resends_after_collector_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let unload = Arc::new(RecordingUnload::new());
    let coordinator = DeliveryCoordinator::new(
        manual_config(),
        Arc::new(transport_for(&mock_server)),
        unload.clone(),
    )
    .unwrap();

    coordinator.enqueue(record("first"));
    coordinator.enqueue(record("second"));

    assert_eq!(
        coordinator.flush().await,
        FlushOutcome::Requeued {
            records: 2,
            reason: FailureReason::HttpStatus(503)
        }
    );
    assert_eq!(
        event_types(&coordinator.pending_records()),
        vec!["first", "second"]
    );

    coordinator.enqueue(record("third"));
    assert_eq!(
        coordinator.flush().await,
        FlushOutcome::Delivered { records: 3 }
    );

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let last: Vec<serde_json::Value> = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(last.len(), 3);
    assert_eq!(last[0]["event"]["type"], "first");
    assert_eq!(unload.send_count(), 0);

    let snapshot = coordinator.metrics_snapshot();
    assert_eq!(snapshot.batches_failed, 1);
    assert_eq!(snapshot.records_requeued, 2);
    assert_eq!(snapshot.records_delivered, 3);
}
