//! Route registration.
//!
//! Every downstream endpoint is described once by a [`RouteDescriptor`]
//! (controller, handler name, verb, path, version) plus a
//! [`RouteSchema`]. The same registry feeds both the request pipeline and the
//! API documentation, so the two cannot drift apart.
//!
//! # Built-in Routes
//!
//! - `GET  /api/v2/v1/`        - `AppController.getHello`
//! - `GET  /api/v2/v1/health`  - `HealthController.check`
//! - `POST /api/v2/v1/uploads` - `UploadsController.create` (multipart)

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::{MethodFilter, MethodRouter, on};

use crate::docs::operation_id;
use crate::handlers;
use crate::middleware::prefix::normalize_prefix;
use crate::state::AppState;
use crate::validation::RouteSchema;

/// HTTP verbs a route can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
            Verb::Options => "OPTIONS",
            Verb::Head => "HEAD",
        }
    }

    pub fn method_filter(&self) -> MethodFilter {
        match self {
            Verb::Get => MethodFilter::GET,
            Verb::Post => MethodFilter::POST,
            Verb::Put => MethodFilter::PUT,
            Verb::Patch => MethodFilter::PATCH,
            Verb::Delete => MethodFilter::DELETE,
            Verb::Options => MethodFilter::OPTIONS,
            Verb::Head => MethodFilter::HEAD,
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and location of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    /// Controller type name, e.g. `UserController`.
    pub controller: String,
    /// Handler method name, e.g. `findAllActive`.
    pub handler: String,
    pub verb: Verb,
    /// Path below the version segment, axum syntax (`/users/{id}`).
    pub path: String,
    pub version: u32,
    pub summary: Option<String>,
}

impl RouteDescriptor {
    pub fn new(
        controller: impl Into<String>,
        handler: impl Into<String>,
        verb: Verb,
        path: impl Into<String>,
        version: u32,
    ) -> Self {
        Self {
            controller: controller.into(),
            handler: handler.into(),
            verb,
            path: path.into(),
            version,
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn operation_id(&self) -> String {
        operation_id(&self.controller, &self.handler)
    }

    /// Documentation tag: the controller name without its `Controller`
    /// suffix.
    pub fn tag(&self) -> &str {
        self.controller
            .strip_suffix("Controller")
            .filter(|tag| !tag.is_empty())
            .unwrap_or(&self.controller)
    }

    /// Path inside the prefix-stripped API router: `/v{version}{path}`.
    pub fn mounted_path(&self) -> String {
        let path = self.path.trim_end_matches('/');
        if path.is_empty() {
            format!("/v{}", self.version)
        } else if path.starts_with('/') {
            format!("/v{}{path}", self.version)
        } else {
            format!("/v{}/{path}", self.version)
        }
    }

    /// Path as seen by clients: `/{prefix}/v{version}{path}`.
    pub fn public_path(&self, prefix: &str) -> String {
        format!("{}{}", normalize_prefix(prefix), self.mounted_path())
    }
}

/// A registered endpoint.
pub struct Route<S> {
    pub descriptor: RouteDescriptor,
    pub schema: Arc<RouteSchema>,
    pub handler: MethodRouter<S>,
}

impl<S> Clone for Route<S> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            schema: self.schema.clone(),
            handler: self.handler.clone(),
        }
    }
}

/// All endpoints of the downstream application, in registration order.
pub struct RouteRegistry<S = AppState> {
    routes: Vec<Route<S>>,
}

impl<S> Default for RouteRegistry<S> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<S> RouteRegistry<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for the descriptor's verb.
    pub fn register<H, T>(mut self, descriptor: RouteDescriptor, schema: RouteSchema, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        let handler = on(descriptor.verb.method_filter(), handler);
        self.routes.push(Route {
            descriptor,
            schema: Arc::new(schema),
            handler,
        });
        self
    }

    pub fn routes(&self) -> &[Route<S>] {
        &self.routes
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &RouteDescriptor> {
        self.routes.iter().map(|route| &route.descriptor)
    }

    /// Every version at least one route registered.
    pub fn versions(&self) -> BTreeSet<u32> {
        self.descriptors().map(|d| d.version).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// The gateway's own endpoints.
pub fn application_routes() -> RouteRegistry<AppState> {
    RouteRegistry::new()
        .register(
            RouteDescriptor::new("AppController", "getHello", Verb::Get, "/", 1)
                .with_summary("Greeting"),
            RouteSchema::new(),
            handlers::get_hello,
        )
        .register(
            RouteDescriptor::new("HealthController", "check", Verb::Get, "/health", 1)
                .with_summary("Service and data-source health"),
            RouteSchema::new(),
            handlers::health_check,
        )
        .register(
            RouteDescriptor::new("UploadsController", "create", Verb::Post, "/uploads", 1)
                .with_summary("Accept a multipart upload and describe its parts"),
            RouteSchema::new().multipart(),
            handlers::create_upload,
        )
}
