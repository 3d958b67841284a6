//! Request pipeline composition.
//!
//! # Stage Order (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────────┐
//! │  Request context     │ ← X-Request-Id, tracing span
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │  CORS                │ ← CorsPolicy (skipped when Disabled)
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │  Compression         │ ← gzip / br / deflate
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │  Security headers    │
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │  Throttle            │ ← 429 (skipped without throttle settings)
//! └──────────┬───────────┘
//!            ├──────────────────► /swagger, /swagger-json
//!            ▼
//! ┌──────────────────────┐
//! │  Versioning          │ ← 404 unless /api/v2/v{N} with N registered
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │  Prefix              │ ← 404 outside /api/v2, strips it otherwise
//! └──────────┬───────────┘
//!            ▼
//!      Route match
//!            ▼
//! ┌──────────────────────┐
//! │  Payload validation  │ ← 400 / 413 / 415, per route schema
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │  Multipart           │ ← 400 / 413, per part limit
//! └──────────┬───────────┘
//!            ▼
//!         Handler
//! ```
//!
//! Versioning and prefix wrap the API router as a service rather than being
//! added with `Router::layer`: they rewrite and reject by URI, so they must
//! run before routing.

use std::collections::HashSet;

use axum::Router;
use axum::extract::OriginalUri;
use axum::http::Method;
use axum::middleware::from_fn_with_state;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{ThrottleSettings, TypedConfig};
use crate::error::{AppError, GatewayError};
use crate::middleware::{
    CorsPolicy, MakeRequestUuidV4, PayloadPolicy, PrefixLayer, REQUEST_ID_HEADER,
    RateLimitLayer, UploadLimits, VersioningLayer, handle_multipart,
    make_request_span, validate_payload, with_security_headers,
};
use crate::routes::RouteRegistry;
use crate::validation::JSON_BODY_LIMIT;

/// Global API prefix.
pub const API_PREFIX: &str = "api/v2";

/// One stage of the request pipeline, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    RequestContext,
    Cors,
    Compression,
    SecurityHeaders,
    Throttle,
    Versioning,
    Prefix,
    PayloadValidation,
    Multipart,
}

impl Stage {
    /// Every stage, outermost first.
    pub const ALL: [Stage; 9] = [
        Stage::RequestContext,
        Stage::Cors,
        Stage::Compression,
        Stage::SecurityHeaders,
        Stage::Throttle,
        Stage::Versioning,
        Stage::Prefix,
        Stage::PayloadValidation,
        Stage::Multipart,
    ];

    /// Stable name used in rejection bodies, logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::RequestContext => "request-context",
            Stage::Cors => "cors",
            Stage::Compression => "compression",
            Stage::SecurityHeaders => "security-headers",
            Stage::Throttle => "throttle",
            Stage::Versioning => "versioning",
            Stage::Prefix => "prefix",
            Stage::PayloadValidation => "payload-validation",
            Stage::Multipart => "multipart",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Stage parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub prefix: String,
    pub cors: CorsPolicy,
    /// `None` removes the throttle stage.
    pub throttle: Option<ThrottleSettings>,
    pub json_body_limit: usize,
    pub uploads: UploadLimits,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            prefix: API_PREFIX.to_string(),
            cors: CorsPolicy::default(),
            throttle: None,
            json_body_limit: JSON_BODY_LIMIT,
            uploads: UploadLimits::default(),
        }
    }
}

impl PipelineSettings {
    /// Defaults plus throttling from the validated configuration.
    pub fn from_config(config: &TypedConfig) -> Self {
        Self {
            throttle: Some(config.throttle),
            ..Self::default()
        }
    }

    pub fn with_cors(mut self, cors: CorsPolicy) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_throttle(mut self, throttle: Option<ThrottleSettings>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_json_body_limit(mut self, limit: usize) -> Self {
        self.json_body_limit = limit;
        self
    }

    /// Per-file ceiling; the other multipart ceilings keep their values.
    pub fn with_upload_part_limit(mut self, limit: usize) -> Self {
        self.uploads = UploadLimits {
            body: UploadLimits::new(limit).body,
            file: limit,
            ..self.uploads
        };
        self
    }

    pub fn with_upload_limits(mut self, limits: UploadLimits) -> Self {
        self.uploads = limits;
        self
    }
}

/// Builds the router for a route registry with every stage in place.
#[derive(Debug, Clone)]
pub struct PipelineComposer {
    settings: PipelineSettings,
}

impl PipelineComposer {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Active stages, outermost first.
    pub fn stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| match stage {
                Stage::Cors => self.settings.cors.is_enabled(),
                Stage::Throttle => self.settings.throttle.is_some(),
                _ => true,
            })
            .collect()
    }

    /// Compose the full application.
    ///
    /// `docs` is merged unprefixed, inside the global stages but outside
    /// versioning, prefix and the per-route stages.
    ///
    /// # Errors
    ///
    /// [`GatewayError::DuplicateRoute`] when two routes share a verb and
    /// path, [`GatewayError::Throttle`] for an unusable throttle window.
    pub fn compose<S>(
        &self,
        registry: &RouteRegistry<S>,
        state: S,
        docs: Router,
    ) -> Result<Router, GatewayError>
    where
        S: Clone + Send + Sync + 'static,
    {
        let settings = &self.settings;

        // =====================================================================
        // Stages 6-7: route layers
        // =====================================================================
        let mut seen = HashSet::new();
        let mut api: Router<S> = Router::new();
        for route in registry.routes() {
            let descriptor = &route.descriptor;
            let mounted = descriptor.mounted_path();
            if !seen.insert((descriptor.verb, mounted.clone())) {
                return Err(GatewayError::DuplicateRoute {
                    verb: descriptor.verb.as_str(),
                    path: descriptor.public_path(&settings.prefix),
                });
            }

            let policy = PayloadPolicy {
                schema: route.schema.clone(),
                json_limit: settings.json_body_limit,
            };
            let handler = route
                .handler
                .clone()
                .layer(from_fn_with_state(settings.uploads, handle_multipart))
                .layer(from_fn_with_state(policy, validate_payload));

            api = api.route(&mounted, handler);
        }
        let api = api.fallback(route_not_found).with_state(state);

        // =====================================================================
        // Stages 4-5: wrap the API router so they run before routing
        // =====================================================================
        let api = ServiceBuilder::new()
            .layer(VersioningLayer::new(&settings.prefix, registry.versions()))
            .layer(PrefixLayer::new(&settings.prefix))
            .service(api);

        let mut router = docs.fallback_service(api);

        // =====================================================================
        // Stages 0-3a: global layers (applied bottom to top)
        // =====================================================================
        if let Some(throttle) = &settings.throttle {
            router = router.layer(RateLimitLayer::new(throttle)?);
        }
        router = with_security_headers(router);
        router = router.layer(CompressionLayer::new());
        if let Some(cors) = settings.cors.layer() {
            router = router.layer(cors);
        }
        router = router
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
            .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
            .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuidV4));

        info!(
            stages = ?self.stages().iter().map(Stage::name).collect::<Vec<_>>(),
            routes = registry.len(),
            prefix = %settings.prefix,
            "Request pipeline composed"
        );

        Ok(router)
    }
}

/// Fallback for paths inside a valid prefix and version that match no route.
async fn route_not_found(method: Method, OriginalUri(uri): OriginalUri) -> AppError {
    AppError::NotFound(format!("Cannot {method} {}", uri.path()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stage_names_are_unique() {
        let names: HashSet<_> = Stage::ALL.iter().map(Stage::name).collect();
        assert_eq!(names.len(), Stage::ALL.len());
    }

    #[test]
    fn test_stage_order_is_total() {
        let mut sorted = Stage::ALL;
        sorted.sort();
        assert_eq!(sorted, Stage::ALL);
    }

    #[test]
    fn test_default_stages_without_throttle() {
        let composer = PipelineComposer::new(PipelineSettings::default());
        assert_eq!(
            composer.stages(),
            vec![
                Stage::RequestContext,
                Stage::Cors,
                Stage::Compression,
                Stage::SecurityHeaders,
                Stage::Versioning,
                Stage::Prefix,
                Stage::PayloadValidation,
                Stage::Multipart,
            ]
        );
    }

    #[test]
    fn test_disabled_cors_removes_stage() {
        let settings = PipelineSettings::default()
            .with_cors(CorsPolicy::Disabled)
            .with_throttle(Some(ThrottleSettings {
                ttl: Duration::from_secs(60),
                limit: 10,
            }));
        let stages = PipelineComposer::new(settings).stages();

        assert!(!stages.contains(&Stage::Cors));
        assert!(stages.contains(&Stage::Throttle));
    }

    #[test]
    fn test_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.prefix, "api/v2");
        assert_eq!(settings.uploads.file, 200 * 1024 * 1024);
        assert_eq!(settings.uploads.parts, 1000);
        assert_eq!(settings.json_body_limit, 1024 * 1024);
    }
}
