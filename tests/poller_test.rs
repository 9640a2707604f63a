use async_trait::async_trait;
use httpmock::prelude::*;
use reactive_ping::config::ClientConfig;
use reactive_ping::core::{PollReport, Poller};
use reactive_ping::{AggregatePoller, PingClient, PingRequest, PingServer, Scheduler, StreamPoller};
use reactive_ping::utils::error::{ErrorCategory, PingError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn client_for_url(base_url: String) -> PingClient {
    let config = ClientConfig {
        base_url: Some(base_url),
        ..ClientConfig::default()
    };
    PingClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_stream_poller_skips_bad_elements() {
    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(GET).path("/ping/buffered/5/200");
        then.status(200)
            .header("Content-Type", "application/json")
            .body(r#"[[{"pong":"Pong1"},{"pong":"Pong2"}],[{"unexpected":true}],[{"pong":"Pong5"}]]"#);
    });

    let poller = StreamPoller::new(client_for_url(server.base_url()), PingRequest::default());
    let report = poller.poll().await.unwrap();

    api_mock.assert();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.batches.len(), 2);
    assert_eq!(report.record_count(), 3);
    assert_eq!(report.label, "Pong1Pong2Pong5");
}

#[tokio::test]
async fn test_stream_poller_reads_ndjson() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/ping/buffered/3/200");
        then.status(200)
            .header("Content-Type", "application/x-ndjson")
            .body("[{\"pong\":\"Pong1\"},{\"pong\":\"Pong2\"}]\n[{\"pong\":\"Pong3\"}]\n");
    });

    let request = PingRequest {
        times: 3,
        delay_ms: 200,
    };
    let poller = StreamPoller::new(client_for_url(server.base_url()), request);
    let report = poller.poll().await.unwrap();

    assert_eq!(report.skipped, 0);
    assert_eq!(report.label, "Pong1Pong2Pong3");
}

#[tokio::test]
async fn test_stream_poller_truncated_body_keeps_complete_batches() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/ping/buffered/5/200");
        then.status(200)
            .header("Content-Type", "application/json")
            .body(r#"[[{"pong":"Pong1"},{"pong":"Pong2"}],[{"pong":"Po"#);
    });

    let poller = StreamPoller::new(client_for_url(server.base_url()), PingRequest::default());
    let report = poller.poll().await.unwrap();

    assert_eq!(report.label, "Pong1Pong2");
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_aggregate_poller_flattens_body() {
    let server = MockServer::start();
    let mock_data = serde_json::json!([
        [{"pong": "Pong1"}, {"pong": "Pong2"}],
        [{"pong": "Pong3"}, {"pong": "Pong4"}],
        [{"pong": "Pong5"}]
    ]);
    let api_mock = server.mock(|when, then| {
        when.method(GET).path("/ping/buffered/5/200");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(mock_data);
    });

    let poller = AggregatePoller::new(client_for_url(server.base_url()), PingRequest::default())
        .with_name("mono");
    let report = poller.poll().await.unwrap();

    api_mock.assert();
    assert_eq!(report.poller, "mono");
    assert_eq!(report.batches.len(), 3);
    assert_eq!(report.label, "Pong1Pong2Pong3Pong4Pong5");
}

#[tokio::test]
async fn test_aggregate_poller_fails_on_bad_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/ping/buffered/5/200");
        then.status(200)
            .header("Content-Type", "application/json")
            .body(r#"[[{"pong":"Pong1"}],[{"unexpected":true}]]"#);
    });

    let poller = AggregatePoller::new(client_for_url(server.base_url()), PingRequest::default());
    let err = poller.poll().await.unwrap_err();
    assert!(matches!(err, PingError::SerializationError(_)));
    assert_eq!(err.category(), ErrorCategory::Data);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let poller = StreamPoller::new(client_for_url(format!("http://{}", addr)), PingRequest::default());
    let err = poller.poll().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Network);
}

fn client_with_timeouts(base_url: String, read_timeout_ms: u64, write_timeout_ms: u64) -> PingClient {
    let config = ClientConfig {
        base_url: Some(base_url),
        read_timeout_ms,
        write_timeout_ms,
        ..ClientConfig::default()
    };
    PingClient::new(&config).unwrap()
}

/// 送出回應標頭與部分內容後就停住的伺服器
async fn start_stalling_server(partial_body: Option<&'static str>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                if let Some(body) = partial_body {
                    let head = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\n\r\n";
                    let chunk = format!("{:x}\r\n{}\r\n", body.len(), body);
                    socket.write_all(head.as_bytes()).await.unwrap();
                    socket.write_all(chunk.as_bytes()).await.unwrap();
                    socket.flush().await.unwrap();
                }
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(socket);
            });
        }
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_stream_poller_stops_on_stalled_body() {
    let base_url = start_stalling_server(Some(r#"[[{"pong":"Pong1"},{"pong":"Pong2"}],"#)).await;
    let poller = StreamPoller::new(client_with_timeouts(base_url, 300, 5000), PingRequest::default());

    let start = Instant::now();
    let report = poller.poll().await.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_secs(3), "poll did not end on the read timeout: {:?}", elapsed);
    assert_eq!(report.label, "Pong1Pong2");
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_read_timeout_against_slow_live_server() {
    let (base_url, shutdown) = start_server().await;
    let request = PingRequest {
        times: 4,
        delay_ms: 400,
    };
    let poller = StreamPoller::new(client_with_timeouts(base_url, 300, 5000), request);

    let start = Instant::now();
    let report = poller.poll().await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(3));
    assert_eq!(report.skipped, 1);
    assert!(report.batches.len() <= 1);

    shutdown.cancel();
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let base_url = start_stalling_server(None).await;
    let poller = AggregatePoller::new(client_with_timeouts(base_url, 5000, 200), PingRequest::default());

    let start = Instant::now();
    let err = poller.poll().await.unwrap_err();

    assert!(start.elapsed() < Duration::from_secs(3));
    assert!(matches!(err, PingError::TimeoutError { .. }));
    assert_eq!(err.category(), ErrorCategory::Network);
    assert!(err.is_transient());
}

async fn start_server() -> (String, CancellationToken) {
    let server = PingServer::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.serve(shutdown.clone()));
    (format!("http://{}", addr), shutdown)
}

#[tokio::test]
async fn test_both_pollers_agree_against_live_server() {
    let (base_url, shutdown) = start_server().await;
    let client = client_for_url(base_url);
    let request = PingRequest {
        times: 5,
        delay_ms: 10,
    };

    let streamed = StreamPoller::new(client.clone(), request).poll().await.unwrap();
    let aggregated = AggregatePoller::new(client, request).poll().await.unwrap();

    assert_eq!(streamed.label, "Pong1Pong2Pong3Pong4Pong5");
    assert_eq!(streamed.label, aggregated.label);
    assert_eq!(streamed.batches, aggregated.batches);
    assert_eq!(streamed.batches.len(), 3);
    assert_eq!(streamed.skipped, 0);

    shutdown.cancel();
}

struct RecordingPoller {
    inner: Box<dyn Poller>,
    labels: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Poller for RecordingPoller {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn poll(&self) -> reactive_ping::Result<PollReport> {
        let report = self.inner.poll().await?;
        self.labels.lock().unwrap().push(report.label.clone());
        Ok(report)
    }
}

#[tokio::test]
async fn test_scheduled_pollers_against_live_server() {
    let (base_url, shutdown) = start_server().await;
    let client = client_for_url(base_url);
    let request = PingRequest {
        times: 3,
        delay_ms: 5,
    };

    let stream_labels = Arc::new(Mutex::new(Vec::new()));
    let aggregate_labels = Arc::new(Mutex::new(Vec::new()));

    let mut scheduler = Scheduler::new();
    scheduler
        .add_job(
            Arc::new(RecordingPoller {
                inner: Box::new(StreamPoller::new(client.clone(), request)),
                labels: stream_labels.clone(),
            }),
            Duration::from_millis(100),
            Duration::from_millis(300),
        )
        .unwrap();
    scheduler
        .add_job(
            Arc::new(RecordingPoller {
                inner: Box::new(AggregatePoller::new(client, request)),
                labels: aggregate_labels.clone(),
            }),
            Duration::ZERO,
            Duration::from_millis(300),
        )
        .unwrap();

    let handles = scheduler.start(shutdown.clone());
    tokio::time::sleep(Duration::from_millis(800)).await;
    shutdown.cancel();
    for handle in handles {
        handle.await.unwrap();
    }

    let stream_labels = stream_labels.lock().unwrap();
    let aggregate_labels = aggregate_labels.lock().unwrap();
    assert!(!stream_labels.is_empty());
    assert!(!aggregate_labels.is_empty());
    assert!(stream_labels.iter().all(|label| label == "Pong1Pong2Pong3"));
    assert!(aggregate_labels.iter().all(|label| label == "Pong1Pong2Pong3"));
}
