//! Request ID generation and the request tracing span.
//!
//! # Usage
//!
//! `tower_http::request_id` does the plumbing:
//! 1. `SetRequestIdLayer` keeps a client-supplied `X-Request-Id` or generates
//!    a UUIDv4 with [`MakeRequestUuidV4`]
//! 2. `PropagateRequestIdLayer` copies it onto the response
//! 3. [`make_request_span`] records it on the per-request tracing span
//!
//! # Client Usage
//!
//! ```bash
//! curl -H "X-Request-Id: my-correlation-id" http://localhost:3000/api/v2/v1/health
//! ```
//!
//! The same ID will be returned in the response for correlation.

use axum::body::Body;
use axum::http::header::HeaderValue;
use axum::http::{HeaderName, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::Span;
use uuid::Uuid;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Generates a fresh UUIDv4 for requests that arrive without an ID.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Extension trait to extract request ID from requests.
pub trait RequestIdExt {
    /// Get the request ID from the request headers.
    fn request_id(&self) -> Option<&str>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
    }
}

/// Span for `TraceLayer::make_span_with`.
pub fn make_request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = request.request_id().unwrap_or("unknown"),
    )
}
