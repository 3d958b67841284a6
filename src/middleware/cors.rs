//! Cross-origin policy.
//!
//! The policy is a stage parameter chosen when the pipeline is composed, not
//! a configuration variable. [`CorsPolicy::Development`] is the default: no
//! origin is allowed, so browsers refuse cross-origin reads while same-origin
//! and non-browser clients are unaffected.
//!
//! # Security Note
//!
//! The CORS layer only decorates responses. Enforcement happens in the
//! browser; a disallowed origin still reaches the handler, it just gets no
//! `Access-Control-Allow-Origin` header back.

use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Request headers cross-origin callers may send.
pub const ALLOWED_HEADERS: [HeaderName; 7] = [
    header::ACCESS_CONTROL_ALLOW_ORIGIN,
    header::ORIGIN,
    HeaderName::from_static("x-requested-with"),
    header::ACCEPT,
    header::CONTENT_TYPE,
    header::AUTHORIZATION,
    HeaderName::from_static("key"),
];

/// Methods cross-origin callers may use.
pub const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::PUT,
    Method::PATCH,
    Method::OPTIONS,
    Method::POST,
    Method::DELETE,
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CorsPolicy {
    /// Static policy with an empty origin allow-list.
    #[default]
    Development,
    /// Same headers and methods as `Development` for the listed origins.
    AllowOrigins(Vec<HeaderValue>),
    /// No cross-origin stage at all.
    Disabled,
}

impl CorsPolicy {
    /// Parse origins, skipping entries that are not valid header values.
    pub fn allow_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let origins = origins
            .into_iter()
            .filter_map(|origin| origin.as_ref().parse().ok())
            .collect();
        CorsPolicy::AllowOrigins(origins)
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, CorsPolicy::Disabled)
    }

    /// Build the layer, or `None` for [`CorsPolicy::Disabled`].
    pub fn layer(&self) -> Option<CorsLayer> {
        let origins = match self {
            CorsPolicy::Development => Vec::new(),
            CorsPolicy::AllowOrigins(origins) => origins.clone(),
            CorsPolicy::Disabled => return None,
        };

        Some(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_headers(ALLOWED_HEADERS.to_vec())
                .expose_headers([header::AUTHORIZATION])
                .allow_credentials(true)
                .allow_methods(ALLOWED_METHODS.to_vec()),
        )
    }
}
