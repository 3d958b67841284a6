use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigurationError;
use crate::data_source::DownstreamInitializationError;
use crate::docs::DocsError;
use crate::metrics;
use crate::middleware::RateLimitError;
use crate::pipeline::Stage;

/// Startup errors. Every variant aborts the process before or while the
/// listener opens; none of them is recoverable at runtime.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    DownstreamInitialization(#[from] DownstreamInitializationError),

    #[error("Invalid throttle configuration: {0}")]
    Throttle(#[from] RateLimitError),

    #[error("Failed to build API documentation: {0}")]
    Docs(#[from] DocsError),

    #[error("Route {verb} {path} is registered twice")]
    DuplicateRoute { verb: &'static str, path: String },

    #[error("Failed to install metrics exporter: {0}")]
    Metrics(String),

    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl GatewayError {
    /// BSD sysexits code for this failure.
    pub fn exit_code(&self) -> exitcode::ExitCode {
        match self {
            GatewayError::EnvFile(_)
            | GatewayError::Configuration(_)
            | GatewayError::Throttle(_)
            | GatewayError::Docs(_) => exitcode::CONFIG,
            GatewayError::DownstreamInitialization(_)
            | GatewayError::Metrics(_)
            | GatewayError::Bind { .. } => exitcode::UNAVAILABLE,
            GatewayError::DuplicateRoute { .. } => exitcode::SOFTWARE,
        }
    }
}

/// A request stopped by one pipeline stage.
///
/// Terminates processing of that request only. The response names the stage
/// so clients can tell what they violated, but never carries configuration
/// values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage} rejected request: {message}")]
pub struct RequestRejection {
    stage: Stage,
    status: StatusCode,
    message: String,
    details: Vec<String>,
}

impl RequestRejection {
    pub fn new(stage: Stage, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            stage,
            status,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &[String] {
        &self.details
    }
}

/// Wire format of a rejection.
#[derive(Serialize)]
struct RejectionBody {
    #[serde(rename = "statusCode")]
    status_code: u16,
    error: &'static str,
    message: String,
    stage: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
}

impl IntoResponse for RequestRejection {
    fn into_response(self) -> Response {
        tracing::warn!(
            stage = %self.stage,
            status = self.status.as_u16(),
            message = %self.message,
            "Request rejected"
        );
        metrics::record_rejection(self.stage, self.status.as_u16());

        let body = RejectionBody {
            status_code: self.status.as_u16(),
            error: self.status.canonical_reason().unwrap_or("Error"),
            message: self.message,
            stage: self.stage.name(),
            details: self.details,
        };

        (self.status, axum::Json(body)).into_response()
    }
}

/// Errors raised by the built-in handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body for handler errors.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full error details server-side for debugging
        // but only expose sanitized messages to clients
        match &self {
            AppError::Internal(_) => tracing::error!(error = %self, "Request failed"),
            _ => tracing::debug!(error = %self, "Request failed"),
        }

        let (status, error_type, message) = match &self {
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred. Please contact support if the issue persists.",
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.as_str()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.as_str()),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: message.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Sanitize serde error messages to avoid leaking internal type information.
///
/// Serde errors can contain internal struct/field names which shouldn't be
/// exposed to external clients. This function extracts the useful parts.
pub fn sanitize_serde_error(e: &serde_json::Error) -> String {
    let msg = e.to_string();

    if msg.contains("invalid type") {
        return "Invalid data type in request body".to_string();
    }

    if msg.contains("EOF while parsing") || msg.contains("expected") {
        return "Malformed JSON in request body".to_string();
    }

    // Generic fallback that doesn't leak internal details
    "Invalid request format".to_string()
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_exit_codes() {
        let config = GatewayError::Configuration(ConfigurationError::new(vec![]));
        assert_eq!(config.exit_code(), exitcode::CONFIG);

        let bind = GatewayError::Bind {
            addr: "0.0.0.0:1".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert_eq!(bind.exit_code(), exitcode::UNAVAILABLE);

        let duplicate = GatewayError::DuplicateRoute {
            verb: "GET",
            path: "/api/v2/v1/".to_string(),
        };
        assert_eq!(duplicate.exit_code(), exitcode::SOFTWARE);
    }

    #[tokio::test]
    async fn test_rejection_response_names_stage() {
        let rejection = RequestRejection::new(
            Stage::Versioning,
            StatusCode::NOT_FOUND,
            "Unsupported API version",
        );

        let response = rejection.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["statusCode"], 404);
        assert_eq!(json["error"], "Not Found");
        assert_eq!(json["stage"], "versioning");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_rejection_is_an_error() {
        let rejection = RequestRejection::new(
            Stage::Multipart,
            StatusCode::PAYLOAD_TOO_LARGE,
            "File too large",
        );
        let boxed: Box<dyn std::error::Error> = Box::new(rejection);

        assert_eq!(boxed.to_string(), "multipart rejected request: File too large");
    }

    #[test]
    fn test_sanitize_malformed_json() {
        let err = serde_json::from_str::<serde_json::Value>("{\"a\":").unwrap_err();
        assert_eq!(sanitize_serde_error(&err), "Malformed JSON in request body");
    }
}
