//! Startup sequence and served HTTP surface over a real socket.
//!
//! Run with: `cargo test --test lifecycle_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::net::{SocketAddr, TcpListener as StdTcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use api_gateway::config::schema::vars;
use api_gateway::connection::IDLE_TIMEOUT;
use api_gateway::{DataSource, GatewayError, RawConfig, ServerLifecycle};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use common::{StubDataSource, find_available_port, multipart_body, valid_raw};

/// A started gateway plus the handle to stop it.
struct TestServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), GatewayError>>,
}

impl TestServer {
    async fn start(raw: RawConfig) -> Self {
        Self::start_with_idle_timeout(raw, IDLE_TIMEOUT).await
    }

    async fn start_with_idle_timeout(raw: RawConfig, idle_timeout: Duration) -> Self {
        let server = ServerLifecycle::new(raw)
            .with_data_source(StubDataSource::up())
            .start()
            .await
            .expect("server should start")
            .with_idle_timeout(idle_timeout);
        let addr = server.local_addr();

        let (shutdown, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            shutdown,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

fn raw_on_free_port() -> (RawConfig, u16) {
    let port = find_available_port();
    (valid_raw().with(vars::PORT, port.to_string()), port)
}

fn nothing_listens_on(port: u16) -> bool {
    TcpStream::connect(("127.0.0.1", port)).is_err()
}

#[tokio::test]
async fn test_serves_built_in_routes() {
    let (raw, port) = raw_on_free_port();
    let server = TestServer::start(raw).await;
    assert_eq!(server.addr.port(), port);

    let client = Client::new();

    let response = client.get(server.url("/api/v2/v1/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "Hello World!");

    let health: Value = client
        .get(server.url("/api/v2/v1/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));

    let response = client.get(server.url("/swagger-json")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc: Value = response.json().await.unwrap();
    assert_eq!(doc["openapi"], "3.0.0");

    server.stop().await;
}

#[tokio::test]
async fn test_multipart_upload_over_http() {
    let (raw, _) = raw_on_free_port();
    let server = TestServer::start(raw).await;

    let form = reqwest::multipart::Form::new()
        .part(
            "file",
            reqwest::multipart::Part::bytes(vec![7u8; 4096])
                .file_name("report.bin")
                .mime_str("application/octet-stream")
                .unwrap(),
        )
        .text("comment", "quarterly");

    let response = Client::new()
        .post(server.url("/api/v2/v1/uploads"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["count"], 2);
    assert_eq!(json["parts"][0]["file_name"], "report.bin");
    assert_eq!(json["parts"][0]["size"], 4096);
    assert_eq!(json["parts"][1]["field_name"], "comment");

    server.stop().await;
}

#[tokio::test]
async fn test_throttle_keyed_by_peer_address() {
    let (raw, _) = raw_on_free_port();
    let raw = raw.with(vars::THROTTLE_LIMIT, "1");
    let server = TestServer::start(raw).await;
    let client = Client::new();

    let first = client.get(server.url("/api/v2/v1/")).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = client.get(server.url("/api/v2/v1/")).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers()["x-ratelimit-limit"], "1");

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_config_never_binds() {
    let (raw, port) = raw_on_free_port();
    let source = StubDataSource::up();

    let err = ServerLifecycle::new(raw.without(vars::REDIS_HOST))
        .with_data_source(source.clone())
        .start()
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Configuration(ref e) if e.contains(vars::REDIS_HOST)));
    assert_eq!(err.exit_code(), exitcode::CONFIG);
    assert!(!source.is_connected(), "data source touched before validation");
    assert!(nothing_listens_on(port));
}

#[tokio::test]
async fn test_unreachable_data_source_never_binds() {
    let (raw, port) = raw_on_free_port();

    let err = ServerLifecycle::new(raw)
        .with_data_source(StubDataSource::down())
        .start()
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::DownstreamInitialization(_)));
    assert_eq!(err.exit_code(), exitcode::UNAVAILABLE);
    assert!(nothing_listens_on(port));
}

#[tokio::test]
async fn test_port_in_use_is_unavailable() {
    let occupied = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let err = ServerLifecycle::new(valid_raw().with(vars::PORT, port.to_string()))
        .with_data_source(StubDataSource::up())
        .start()
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Bind { .. }));
    assert_eq!(err.exit_code(), exitcode::UNAVAILABLE);
}

#[tokio::test]
async fn test_refused_database_port_aborts_startup() {
    // DATABASE_PORT points at a port nothing listens on.
    let (raw, _) = raw_on_free_port();
    let dead = find_available_port();
    let raw = raw
        .with(vars::DATABASE_HOST, "127.0.0.1")
        .with(vars::DATABASE_PORT, dead.to_string());

    let source = Arc::new(
        api_gateway::TcpProbeDataSource::default()
            .with_retry(api_gateway::data_source::RetryPolicy::none()),
    );
    let err = ServerLifecycle::new(raw)
        .with_data_source(source)
        .start()
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::DownstreamInitialization(_)));
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let (raw, _) = raw_on_free_port();
    let server = TestServer::start_with_idle_timeout(raw, Duration::from_millis(200)).await;

    let mut stream = tokio::net::TcpStream::connect(server.addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("server should close an idle connection");

    // Either a clean EOF or a reset, never data.
    assert!(matches!(read, Ok(0) | Err(_)));

    server.stop().await;
}

#[tokio::test]
async fn test_slow_active_upload_outlives_idle_window() {
    let (raw, _) = raw_on_free_port();
    let server = TestServer::start_with_idle_timeout(raw, Duration::from_millis(300)).await;

    let boundary = "slow-upload-boundary";
    let body = multipart_body(boundary, &[("file", "slow.bin", &[b'z'; 4096])]);
    let head = format!(
        "POST /api/v2/v1/uploads HTTP/1.1\r\n\
         Host: {}\r\n\
         Content-Type: multipart/form-data; boundary={boundary}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n",
        server.addr,
        body.len()
    );

    let mut stream = tokio::net::TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(head.as_bytes()).await.unwrap();
    // Ten chunks 150 ms apart: well past the idle window in total, but never
    // silent for longer than half of it.
    for chunk in body.chunks(body.len().div_ceil(10)) {
        tokio::time::sleep(Duration::from_millis(150)).await;
        stream.write_all(chunk).await.unwrap();
    }

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 201"), "{response}");

    server.stop().await;
}
