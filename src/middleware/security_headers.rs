//! Hardening response headers.
//!
//! Mirrors the defaults of the common Node `helmet` bundle so that clients
//! and scanners see the same header set regardless of which gateway build
//! answers. A header an inner service already set is kept, which lets the
//! docs routes carry a looser content security policy for their CDN assets.
//! `X-Powered-By` is always removed.

use axum::Router;
use axum::http::header::{HeaderName, HeaderValue};
use axum::middleware::map_response;
use axum::response::Response;
use tower_http::set_header::SetResponseHeaderLayer;

/// The helmet default set, in the order helmet emits them.
pub const SECURITY_HEADERS: &[(&str, &str)] = &[
    (
        "content-security-policy",
        "default-src 'self';base-uri 'self';font-src 'self' https: data:;\
         form-action 'self';frame-ancestors 'self';img-src 'self' data:;\
         object-src 'none';script-src 'self';script-src-attr 'none';\
         style-src 'self' https: 'unsafe-inline';upgrade-insecure-requests",
    ),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

async fn strip_powered_by(mut response: Response) -> Response {
    response.headers_mut().remove(X_POWERED_BY);
    response
}

/// Wrap `router` in the security header stage.
pub fn with_security_headers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    SECURITY_HEADERS.iter().fold(
        router.layer(map_response(strip_powered_by)),
        |router, &(name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            ))
        },
    )
}
