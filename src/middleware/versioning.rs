//! URI versioning.
//!
//! Under the API prefix the first segment selects the API version:
//! `/api/v2/v1/health` is version 1. Only versions some route registered are
//! accepted; the version travels on as an [`ApiVersion`] extension. Paths
//! outside the prefix pass through untouched and are left to the prefix stage.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use tower::{Layer, Service};

use super::prefix::{normalize_prefix, strip_prefix};
use crate::error::RequestRejection;
use crate::pipeline::Stage;

/// API version selected by the request URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApiVersion(pub u32);

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Parse the version segment at the start of a prefix-relative path.
///
/// Accepts `v{N}` in canonical form only: `v01` and `V1` are not versions.
pub fn parse_version_segment(rest: &str) -> Option<u32> {
    let segment = rest.trim_start_matches('/').split('/').next()?;
    let digits = segment.strip_prefix('v')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

#[derive(Clone)]
pub struct VersioningLayer {
    prefix: Arc<str>,
    versions: Arc<BTreeSet<u32>>,
}

impl VersioningLayer {
    pub fn new(prefix: &str, versions: BTreeSet<u32>) -> Self {
        Self {
            prefix: normalize_prefix(prefix).into(),
            versions: Arc::new(versions),
        }
    }
}

impl<S> Layer<S> for VersioningLayer {
    type Service = VersioningService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        VersioningService {
            inner,
            prefix: self.prefix.clone(),
            versions: self.versions.clone(),
        }
    }
}

#[derive(Clone)]
pub struct VersioningService<S> {
    inner: S,
    prefix: Arc<str>,
    versions: Arc<BTreeSet<u32>>,
}

impl<S> VersioningService<S> {
    fn reject(&self, req: &Request<Body>, detail: String) -> RequestRejection {
        RequestRejection::new(
            Stage::Versioning,
            StatusCode::NOT_FOUND,
            format!("Cannot {} {}", req.method(), req.uri().path()),
        )
        .with_details(vec![detail])
    }
}

impl<S> Service<Request<Body>> for VersioningService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let selected = match strip_prefix(req.uri().path(), &self.prefix) {
            None => None,
            Some(rest) => match parse_version_segment(rest) {
                Some(version) if self.versions.contains(&version) => Some(ApiVersion(version)),
                Some(version) => {
                    let rejection =
                        self.reject(&req, format!("API version v{version} is not supported"));
                    return Box::pin(async move { Ok(rejection.into_response()) });
                }
                None => {
                    let rejection = self.reject(&req, "missing API version segment".to_string());
                    return Box::pin(async move { Ok(rejection.into_response()) });
                }
            },
        };

        if let Some(version) = selected {
            req.extensions_mut().insert(version);
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::ServiceExt;

    async fn echo_version(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let version = req
            .extensions()
            .get::<ApiVersion>()
            .map(ToString::to_string)
            .unwrap_or_else(|| "none".to_string());
        Ok(Response::new(Body::from(version)))
    }

    async fn call(path: &str) -> (StatusCode, String) {
        let layer = VersioningLayer::new("api/v2", BTreeSet::from([1, 2]));
        let response = layer
            .layer(tower::service_fn(echo_version))
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_parse_version_segment() {
        assert_eq!(parse_version_segment("/v1/health"), Some(1));
        assert_eq!(parse_version_segment("/v12"), Some(12));
        assert_eq!(parse_version_segment("/v01"), None);
        assert_eq!(parse_version_segment("/V1"), None);
        assert_eq!(parse_version_segment("/version"), None);
        assert_eq!(parse_version_segment("/v"), None);
        assert_eq!(parse_version_segment(""), None);
    }

    #[tokio::test]
    async fn test_registered_version_is_recorded() {
        let (status, body) = call("/api/v2/v2/items").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "v2");
    }

    #[tokio::test]
    async fn test_unregistered_version_is_rejected() {
        let (status, body) = call("/api/v2/v9/items").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["stage"], "versioning");
        assert_eq!(json["details"][0], "API version v9 is not supported");
    }

    #[tokio::test]
    async fn test_missing_version_is_rejected() {
        let (status, body) = call("/api/v2/items").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("missing API version segment"));
    }

    #[tokio::test]
    async fn test_paths_outside_prefix_pass_through() {
        let (status, body) = call("/elsewhere").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "none");
    }
}
