//! Shared fixtures for the integration tests.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use api_gateway::config::DatabaseSettings;
use api_gateway::config::schema::vars;
use api_gateway::{
    AppState, ConfigStore, DataSource, DocumentationComposer, DownstreamInitializationError,
    PipelineComposer, PipelineSettings, RawConfig, RouteRegistry, application_routes,
};
use axum::Router;
use axum::body::Body;
use axum::http::Response;
use futures_util::future::BoxFuture;
use http_body_util::BodyExt;

/// Every required variable with a valid value, TLS disabled.
pub fn valid_raw() -> RawConfig {
    [
        (vars::NODE_ENV, "test"),
        (vars::HOST, "127.0.0.1"),
        (vars::PORT, "3000"),
        (vars::REDIS_HOST, "localhost"),
        (vars::REDIS_PORT, "6379"),
        (vars::THROTTLE_TTL, "60"),
        (vars::THROTTLE_LIMIT, "100"),
        (vars::LOG_LEVEL, "info"),
        (vars::DATABASE_TYPE, "postgres"),
        (vars::DATABASE_HOST, "localhost"),
        (vars::DATABASE_PORT, "5432"),
        (vars::DATABASE_USERNAME, "gateway"),
        (vars::DATABASE_PASSWORD, "secret"),
        (vars::DATABASE_NAME, "gateway"),
        (vars::DATABASE_SYNCHRONIZE, "false"),
        (vars::DATABASE_LOGGING, "false"),
        (vars::DATABASE_MAX_CONNECTIONS, "10"),
    ]
    .into_iter()
    .collect()
}

/// Data source double that never touches the network.
#[derive(Debug)]
pub struct StubDataSource {
    reachable: bool,
    connected: AtomicBool,
}

impl StubDataSource {
    pub fn up() -> Arc<Self> {
        Arc::new(Self {
            reachable: true,
            connected: AtomicBool::new(false),
        })
    }

    pub fn down() -> Arc<Self> {
        Arc::new(Self {
            reachable: false,
            connected: AtomicBool::new(false),
        })
    }
}

impl DataSource for StubDataSource {
    fn name(&self) -> &str {
        "stub"
    }

    fn initialize<'a>(
        &'a self,
        settings: &'a DatabaseSettings,
    ) -> BoxFuture<'a, Result<(), DownstreamInitializationError>> {
        Box::pin(async move {
            if self.reachable {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(DownstreamInitializationError::Unreachable {
                    kind: settings.kind.clone(),
                    addr: settings.address(),
                    source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
                })
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.connected.load(Ordering::SeqCst) })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub fn app_state() -> AppState {
    let source = StubDataSource::up();
    source.connected.store(true, Ordering::SeqCst);
    AppState::new(ConfigStore::load(&valid_raw()).unwrap(), source)
}

/// The built-in routes behind the full pipeline, docs included.
pub fn gateway(settings: PipelineSettings) -> Router {
    compose(&application_routes(), app_state(), settings)
}

/// Any registry behind the full pipeline, docs included.
pub fn compose<S>(registry: &RouteRegistry<S>, state: S, settings: PipelineSettings) -> Router
where
    S: Clone + Send + Sync + 'static,
{
    let docs = DocumentationComposer::new()
        .build(registry, &settings)
        .expect("docs compose");
    PipelineComposer::new(settings)
        .compose(registry, state, docs.router())
        .expect("pipeline compose")
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("JSON body")
}

/// Find an available port for a test server.
pub fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to ephemeral port")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

/// Build a `multipart/form-data` body with one part per entry.
///
/// An empty file name makes a plain form field.
pub fn multipart_body(boundary: &str, parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, file_name, data) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        if file_name.is_empty() {
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
            );
        } else {
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
