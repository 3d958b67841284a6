//! Global path prefix.
//!
//! Every API route lives under one prefix (`/api/v2`). This stage strips it so
//! the inner router only sees `/v{N}/...`, and rejects anything outside it.
//! Trailing slashes are dropped while rewriting, so `/api/v2/v1/` and
//! `/api/v2/v1` reach the same route.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::uri::PathAndQuery;
use axum::http::{Request, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::debug;

use crate::error::RequestRejection;
use crate::pipeline::Stage;

/// Normalize a configured prefix (`api/v2`, `/api/v2/`) to `/api/v2`.
///
/// An empty prefix normalizes to the empty string and matches every path.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// The remainder of `path` after a normalized prefix, or `None` when the path
/// is outside it. Segment boundaries are respected: `/api/v2x` is outside
/// `/api/v2`.
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn rewrite_uri(uri: &Uri, rest: &str) -> Option<Uri> {
    let path = rest.trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };

    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}

#[derive(Clone)]
pub struct PrefixLayer {
    prefix: Arc<str>,
}

impl PrefixLayer {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: normalize_prefix(prefix).into(),
        }
    }
}

impl<S> Layer<S> for PrefixLayer {
    type Service = PrefixService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PrefixService {
            inner,
            prefix: self.prefix.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PrefixService<S> {
    inner: S,
    prefix: Arc<str>,
}

impl<S> Service<Request<Body>> for PrefixService<S>
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
        let rewritten = strip_prefix(req.uri().path(), &self.prefix)
            .and_then(|rest| rewrite_uri(req.uri(), rest));

        let Some(uri) = rewritten else {
            let rejection = RequestRejection::new(
                Stage::Prefix,
                StatusCode::NOT_FOUND,
                format!("Cannot {} {}", req.method(), req.uri().path()),
            )
            .with_details(vec![format!("path is outside the {} prefix", self.prefix)]);
            return Box::pin(async move { Ok(rejection.into_response()) });
        };

        debug!(from = %req.uri().path(), to = %uri.path(), "Stripped API prefix");
        *req.uri_mut() = uri;

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}
