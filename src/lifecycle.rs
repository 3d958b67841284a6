//! Server startup and shutdown.
//!
//! # Startup Sequence
//!
//! ```text
//! RawConfig
//!    │ validate (aggregate all violations)      ── ConfigurationError → exit CONFIG
//!    ▼
//! ConfigStore
//!    │ DataSource::initialize                   ── DownstreamInitializationError → exit UNAVAILABLE
//!    ▼
//! metrics exporter (METRICS_PORT > 0)
//!    │
//!    ▼
//! RouteRegistry → OpenAPI document → PipelineComposer
//!    │
//!    ▼
//! bind (HOST, PORT)                             ── Bind → exit UNAVAILABLE
//!    │ "[Api Gateway] Listening on port ..."
//!    ▼
//! RunningServer::serve(shutdown)
//! ```
//!
//! Nothing listens until every earlier step has succeeded. Once serving, a
//! connection idle for [`IDLE_TIMEOUT`] is closed.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{ConfigStore, RawConfig};
use crate::connection::{self, IDLE_TIMEOUT};
use crate::data_source::{DataSource, TcpProbeDataSource};
use crate::docs::DocumentationComposer;
use crate::error::GatewayError;
use crate::metrics;
use crate::middleware::CorsPolicy;
use crate::pipeline::{PipelineComposer, PipelineSettings};
use crate::routes::{RouteRegistry, application_routes};
use crate::state::AppState;

/// Builder for a gateway process.
pub struct ServerLifecycle {
    raw: RawConfig,
    data_source: Arc<dyn DataSource>,
    cors: CorsPolicy,
    routes: Option<RouteRegistry<AppState>>,
}

impl ServerLifecycle {
    /// A lifecycle over `raw` with the TCP probe data source, the development
    /// CORS policy and the built-in routes.
    pub fn new(raw: RawConfig) -> Self {
        Self {
            raw,
            data_source: Arc::new(TcpProbeDataSource::default()),
            cors: CorsPolicy::default(),
            routes: None,
        }
    }

    pub fn with_data_source(mut self, data_source: Arc<dyn DataSource>) -> Self {
        self.data_source = data_source;
        self
    }

    pub fn with_cors(mut self, cors: CorsPolicy) -> Self {
        self.cors = cors;
        self
    }

    /// Replace the built-in routes.
    pub fn with_routes(mut self, routes: RouteRegistry<AppState>) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Run every startup step and bind the listener.
    ///
    /// # Errors
    ///
    /// The first failing step, see [`GatewayError::exit_code`] for the
    /// process exit status of each.
    pub async fn start(self) -> Result<RunningServer, GatewayError> {
        let config = ConfigStore::load(&self.raw)?;
        info!(
            environment = config.environment.as_str(),
            host = %config.app.host,
            port = config.app.port,
            log_level = config.log_level.as_filter(),
            "Configuration validated"
        );
        if !config.is_production() && config.database.synchronize {
            warn!("DATABASE_SYNCHRONIZE is enabled outside production");
        }

        info!(
            kind = %config.database.kind,
            addr = %config.database.address(),
            "Connecting to data source..."
        );
        self.data_source.initialize(&config.database).await?;
        metrics::set_data_source_status(true);

        if let Some(addr) = config.metrics_addr() {
            metrics::init_metrics(addr).map_err(GatewayError::Metrics)?;
        }

        let registry = self.routes.unwrap_or_else(application_routes);
        let settings = PipelineSettings::from_config(&config).with_cors(self.cors);
        let docs = DocumentationComposer::new().build(&registry, &settings)?;

        let state = AppState::new(config.clone(), self.data_source);
        let app = PipelineComposer::new(settings).compose(&registry, state, docs.router())?;

        let addr = config.server_addr();
        let listener = TcpListener::bind((config.app.host.as_str(), config.app.port))
            .await
            .map_err(|source| GatewayError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| GatewayError::Bind { addr, source })?;

        info!(
            "[Api Gateway] Listening on port {} on http://{local_addr}",
            local_addr.port()
        );

        Ok(RunningServer {
            listener,
            app,
            local_addr,
            config,
            idle_timeout: IDLE_TIMEOUT,
        })
    }

    /// [`start`](Self::start) then [`RunningServer::serve`].
    ///
    /// # Errors
    ///
    /// Any startup or server error.
    pub async fn run<F>(self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.start().await?.serve(shutdown).await
    }
}

/// A bound, not yet serving, gateway.
pub struct RunningServer {
    listener: TcpListener,
    app: Router,
    local_addr: SocketAddr,
    config: ConfigStore,
    idle_timeout: Duration,
}

impl RunningServer {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Replace the per-connection idle window.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    ///
    /// Accept failures are logged and retried rather than returned.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        connection::serve(self.listener, self.app, self.idle_timeout, shutdown).await;

        info!("Server shutdown complete");
        Ok(())
    }
}

impl std::fmt::Debug for RunningServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningServer")
            .field("local_addr", &self.local_addr)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}
