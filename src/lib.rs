//! # API Gateway
//!
//! Bootstrap layer of an HTTP API gateway on Axum:
//!
//! - **Fail-fast configuration**: every environment variable is checked
//!   against one rule table and all violations are reported together
//! - **Fixed request pipeline**: request id, CORS, compression, security
//!   headers, throttling, URI versioning, global prefix, payload validation
//!   and multipart parsing, always in that order
//! - **Generated documentation**: OpenAPI 3.0 and Swagger UI derived from the
//!   same route registry the pipeline serves
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ServerLifecycle (validate → data source → compose → bind)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Global stages (Request Id → CORS → Compression → Headers   │
//! │                 → Throttle)                                 │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  Versioning → Prefix         │  /swagger, /swagger-json     │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │  Route stages (Payload validation → Multipart)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (app, health, uploads)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  DataSource (TCP probe of DATABASE_HOST:DATABASE_PORT)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use api_gateway::{RawConfig, ServerLifecycle, utils};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), api_gateway::GatewayError> {
//!     let raw = RawConfig::from_env()?;
//!     let server = ServerLifecycle::new(raw).start().await?;
//!     server.serve(utils::shutdown_signal()).await
//! }
//! ```

pub mod config;
pub mod connection;
pub mod data_source;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::{ConfigStore, ConfigurationError, RawConfig, TypedConfig};
pub use data_source::{DataSource, DownstreamInitializationError, TcpProbeDataSource};
pub use docs::{ApiDocument, DocumentationComposer};
pub use error::{AppError, AppResult, GatewayError, RequestRejection};
pub use lifecycle::{RunningServer, ServerLifecycle};
pub use middleware::CorsPolicy;
pub use pipeline::{PipelineComposer, PipelineSettings, Stage};
pub use routes::{RouteDescriptor, RouteRegistry, Verb, application_routes};
pub use state::AppState;
