//! Health endpoint.
//!
//! # Endpoints
//!
//! - `GET /api/v2/v1/health` - Service health with data-source status
//!
//! Always returns 200; a lost data source shows up as `degraded` in the body
//! rather than as an error status, so load balancers keep routing to the
//! process while it reconnects.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::metrics;
use crate::models::{DataSourceStatus, HealthResponse};
use crate::state::AppState;

/// Health check endpoint.
///
/// Re-probes the data source on every call.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "environment": "production",
///   "data_source": { "name": "postgres", "connected": true },
///   "version": "0.1.0",
///   "uptime_seconds": 3600,
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.data_source.health_check().await;
    metrics::set_data_source_status(connected);

    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        environment: state.config.environment.as_str().to_string(),
        data_source: DataSourceStatus {
            name: state.data_source.name().to_string(),
            connected,
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
