use edgekite_agent::app::{App, Config, TeardownSignal};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, BufReader, ReadBuf};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

const BATCH_PATH: &str = "/api/events/batch";

/// Reader whose every read fails, as a closed stdin pipe would.
struct BrokenPipe;

impl AsyncRead for BrokenPipe {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "stdin closed",
        )))
    }
}

async fn collector() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BATCH_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    mock_server
}

/// Batches never fill and the timer never fires, so the only POST a run
/// can produce is the teardown one.
fn app_for(server: &MockServer) -> App {
    let batch_url = format!("{}{BATCH_PATH}", server.uri());
    let config = Config::from_args([
        "edgekite-agent",
        "--batch-endpoint",
        batch_url.as_str(),
        "--batch-interval-ms",
        "3600000",
        "--teardown-grace-ms",
        "5000",
    ])
    .unwrap();
    App::from_config(config).unwrap()
}

async fn received_event_types(server: &MockServer) -> Vec<Vec<String>> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| {
            let records: Vec<serde_json::Value> = serde_json::from_slice(&request.body).unwrap();
            records
                .iter()
                .map(|r| r["event"]["type"].as_str().unwrap().to_string())
                .collect()
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_end_of_input_flushes_pending_records() {
    let mock_server = collector().await;
    let app = app_for(&mock_server);
    let coordinator = app.tracker().coordinator().clone();

    let input: &[u8] = b"{\"type\":\"a\"}\n{\"type\":\"b\"}\n";
    let summary = app.run(input).await.unwrap();

    assert_eq!(summary.signal, TeardownSignal::EndOfInput);
    assert_eq!(summary.handed_off, 2);
    assert!(summary.drained);
    assert!(coordinator.is_torn_down());
    assert_eq!(coordinator.queue_len(), 0);
    assert_eq!(received_event_types(&mock_server).await, vec![vec!["a", "b"]]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_page_leave_sends_one_teardown_batch() {
    let mock_server = collector().await;
    let app = app_for(&mock_server);

    let input: &[u8] = b"{\"type\":\"a\"}\n{\"type\":\"page_leave\"}\n{\"type\":\"after\"}\n";
    let summary = app.run(input).await.unwrap();

    // The page_leave already flushed, so the exit teardown has nothing left.
    assert_eq!(summary.signal, TeardownSignal::PageLeave);
    assert_eq!(summary.handed_off, 0);
    assert!(summary.drained);
    assert_eq!(
        received_event_types(&mock_server).await,
        vec![vec!["a", "page_leave"]]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reader_error_still_flushes_before_returning() {
    let mock_server = collector().await;
    let app = app_for(&mock_server);
    let coordinator = app.tracker().coordinator().clone();

    let lines: &[u8] = b"{\"type\":\"a\"}\n{\"type\":\"b\"}\n";
    let input = BufReader::new(lines.chain(BrokenPipe));
    let result = app.run(input).await;

    assert!(result.is_err());
    assert!(coordinator.is_torn_down());
    assert_eq!(coordinator.queue_len(), 0);
    assert_eq!(received_event_types(&mock_server).await, vec![vec!["a", "b"]]);
}
