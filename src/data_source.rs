//! Downstream data-source connection.
//!
//! The gateway does not speak any database protocol itself. At startup it
//! needs to know the configured data source is reachable before the listener
//! opens, and at runtime the health endpoint reports on it. Both go through
//! the [`DataSource`] trait so tests and embedders can swap the probe out.
//!
//! # Retry Behavior
//!
//! [`TcpProbeDataSource::initialize`] retries with exponential backoff:
//!
//! ```text
//! attempt 1 ── fail ── sleep(base) ── attempt 2 ── fail ── sleep(2 * base) ── ...
//! ```
//!
//! Delays are capped at `max_delay`. After `attempts` failures the last error
//! is returned and startup aborts.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::DatabaseSettings;

/// Per-attempt connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The data source could not be reached at startup.
#[derive(Debug, Error)]
pub enum DownstreamInitializationError {
    #[error("Timed out after {timeout:?} connecting to {kind} at {addr}")]
    Timeout {
        kind: String,
        addr: String,
        timeout: Duration,
    },

    #[error("Unable to connect to {kind} at {addr}: {source}")]
    Unreachable {
        kind: String,
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Connection to the downstream data source.
pub trait DataSource: Send + Sync + 'static {
    /// Short name for logs and the health endpoint.
    fn name(&self) -> &str;

    /// Establish the connection. Called once, before the listener binds.
    fn initialize<'a>(
        &'a self,
        settings: &'a DatabaseSettings,
    ) -> BoxFuture<'a, Result<(), DownstreamInitializationError>>;

    /// Re-check reachability. Must not fail the caller; returns the new state.
    fn health_check(&self) -> BoxFuture<'_, bool>;

    /// Last known state without doing any I/O.
    fn is_connected(&self) -> bool;
}

/// Backoff schedule for the startup connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Checks that `DATABASE_HOST:DATABASE_PORT` accepts TCP connections.
#[derive(Debug)]
pub struct TcpProbeDataSource {
    connect_timeout: Duration,
    retry: RetryPolicy,
    target: OnceLock<(String, String)>,
    connected: AtomicBool,
}

impl Default for TcpProbeDataSource {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl TcpProbeDataSource {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            retry: RetryPolicy::default(),
            target: OnceLock::new(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn probe(&self, kind: &str, addr: &str) -> Result<(), DownstreamInitializationError> {
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(source)) => Err(DownstreamInitializationError::Unreachable {
                kind: kind.to_string(),
                addr: addr.to_string(),
                source,
            }),
            Err(_) => Err(DownstreamInitializationError::Timeout {
                kind: kind.to_string(),
                addr: addr.to_string(),
                timeout: self.connect_timeout,
            }),
        }
    }
}

impl DataSource for TcpProbeDataSource {
    fn name(&self) -> &str {
        self.target.get().map_or("database", |(kind, _)| kind.as_str())
    }

    fn initialize<'a>(
        &'a self,
        settings: &'a DatabaseSettings,
    ) -> BoxFuture<'a, Result<(), DownstreamInitializationError>> {
        Box::pin(async move {
            let kind = settings.kind.as_str();
            let addr = settings.address();
            let attempts = self.retry.attempts.max(1);

            let mut attempt = 1;
            loop {
                match self.probe(kind, &addr).await {
                    Ok(()) => {
                        let _ = self.target.set((kind.to_string(), addr.clone()));
                        self.connected.store(true, Ordering::SeqCst);
                        info!(kind, addr = %addr, attempt, "Data source reachable");
                        return Ok(());
                    }
                    Err(e) if attempt >= attempts => {
                        self.connected.store(false, Ordering::SeqCst);
                        return Err(e);
                    }
                    Err(e) => {
                        let delay = self.retry.delay_after(attempt);
                        warn!(
                            attempt,
                            attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Unable to connect to the data source. Retrying"
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let Some((kind, addr)) = self.target.get() else {
                return false;
            };
            let reachable = self.probe(kind, addr).await.is_ok();
            let was = self.connected.swap(reachable, Ordering::SeqCst);
            if was != reachable {
                warn!(kind, addr = %addr, reachable, "Data source state changed");
            } else {
                debug!(kind, reachable, "Data source health check");
            }
            reachable
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn settings(host: &str, port: u16) -> DatabaseSettings {
        DatabaseSettings {
            kind: "postgres".to_string(),
            host: host.to_string(),
            port,
            username: "user".to_string(),
            password: "secret".to_string(),
            name: "app".to_string(),
            synchronize: false,
            logging: false,
            max_connections: 1,
            tls: None,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_secs(1));
        assert_eq!(policy.delay_after(3), Duration::from_secs(2));
        assert_eq!(policy.delay_after(4), Duration::from_secs(3));
        assert_eq!(policy.delay_after(40), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_initialize_against_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let source = TcpProbeDataSource::default().with_retry(RetryPolicy::none());
        assert!(!source.is_connected());

        source.initialize(&settings("127.0.0.1", port)).await.unwrap();

        assert!(source.is_connected());
        assert_eq!(source.name(), "postgres");
        assert!(source.health_check().await);
    }

    #[tokio::test]
    async fn test_initialize_fails_when_nothing_listens() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let source = TcpProbeDataSource::new(Duration::from_secs(1)).with_retry(RetryPolicy {
            attempts: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
        });
        let err = source
            .initialize(&settings("127.0.0.1", port))
            .await
            .unwrap_err();

        assert!(matches!(err, DownstreamInitializationError::Unreachable { .. }));
        assert!(!source.is_connected());
    }

    #[tokio::test]
    async fn test_health_check_before_initialize() {
        let source = TcpProbeDataSource::default();
        assert!(!source.health_check().await);
    }
}
