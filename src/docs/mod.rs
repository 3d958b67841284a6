//! API documentation derived from the route registry.
//!
//! # Endpoints
//!
//! - `GET /swagger`      - Swagger UI (operation ids shown, nothing expanded)
//! - `GET /swagger-json` - The OpenAPI 3.0 document
//!
//! Both sit outside the API prefix. The document is rendered once at startup;
//! composing it twice from the same registry yields identical bytes.

pub mod openapi;
pub mod operation_id;
pub mod swagger;

use std::collections::{BTreeMap, BTreeSet};

use axum::Router;
use axum::http::header::{self, HeaderValue};
use axum::response::Html;
use axum::routing::get;
use bytes::Bytes;
use thiserror::Error;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::debug;

use crate::pipeline::PipelineSettings;
use crate::routes::{RouteDescriptor, RouteRegistry, Verb};
use crate::validation::{BodySchema, PayloadSchema, RouteSchema};

pub use openapi::OpenApi;
pub use operation_id::operation_id;
pub use swagger::{DocExpansion, SwaggerUi};

use openapi::{
    Components, Info, MediaType, OPENAPI_VERSION, Operation, Parameter, ParameterIn, PathItem,
    RequestBody, Response, Schema, SecurityScheme, Tag,
};

/// Document title.
pub const DOCS_TITLE: &str = "API Gateway microservices";

/// Document version.
pub const DOCS_VERSION: &str = "1.0";

/// Swagger UI path.
pub const SWAGGER_PATH: &str = "/swagger";

/// OpenAPI JSON path.
pub const SWAGGER_JSON_PATH: &str = "/swagger-json";

/// Name of the bearer security scheme.
pub const BEARER_SCHEME: &str = "bearer";

#[derive(Debug, Error)]
pub enum DocsError {
    #[error("Failed to serialize OpenAPI document: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Two routes map to the same operation id; generated clients would
    /// collide.
    #[error("Operation id '{operation_id}' is used by both {first} and {second}")]
    DuplicateOperationId {
        operation_id: String,
        first: String,
        second: String,
    },

    #[error("Route {verb} {path} is documented twice")]
    DuplicateRoute { verb: &'static str, path: String },
}

/// The rendered document plus the Swagger UI page.
#[derive(Debug, Clone)]
pub struct ApiDocument {
    spec: OpenApi,
    json: Bytes,
    html: Bytes,
}

impl ApiDocument {
    pub fn spec(&self) -> &OpenApi {
        &self.spec
    }

    /// The serialized document served at [`SWAGGER_JSON_PATH`].
    pub fn json(&self) -> &[u8] {
        &self.json
    }

    /// Router serving [`SWAGGER_PATH`] and [`SWAGGER_JSON_PATH`].
    pub fn router(&self) -> Router {
        let html = self.html.clone();
        let json = self.json.clone();

        Router::new()
            .route(
                SWAGGER_PATH,
                get(move || {
                    let html = html.clone();
                    async move { Html(html) }
                }),
            )
            .route(
                SWAGGER_JSON_PATH,
                get(move || {
                    let json = json.clone();
                    async move { ([(header::CONTENT_TYPE, "application/json")], json) }
                }),
            )
            .layer(SetResponseHeaderLayer::overriding(
                header::CONTENT_SECURITY_POLICY,
                HeaderValue::from_static(swagger::DOCS_CONTENT_SECURITY_POLICY),
            ))
    }
}

/// Builds the OpenAPI document for a registry.
#[derive(Debug, Clone)]
pub struct DocumentationComposer {
    title: String,
    version: String,
}

impl Default for DocumentationComposer {
    fn default() -> Self {
        Self {
            title: DOCS_TITLE.to_string(),
            version: DOCS_VERSION.to_string(),
        }
    }
}

impl DocumentationComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compose the document.
    ///
    /// # Errors
    ///
    /// [`DocsError::DuplicateOperationId`] when two routes derive the same
    /// operation id, [`DocsError::DuplicateRoute`] when two routes share a
    /// verb and path.
    pub fn build<S>(
        &self,
        registry: &RouteRegistry<S>,
        settings: &PipelineSettings,
    ) -> Result<ApiDocument, DocsError>
    where
        S: Clone + Send + Sync + 'static,
    {
        let mut paths: BTreeMap<String, PathItem> = BTreeMap::new();
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        let mut tags = BTreeSet::new();

        for route in registry.routes() {
            let descriptor = &route.descriptor;
            let id = descriptor.operation_id();
            let owner = format!("{}.{}", descriptor.controller, descriptor.handler);

            if let Some(first) = owners.get(&id) {
                return Err(DocsError::DuplicateOperationId {
                    operation_id: id,
                    first: first.clone(),
                    second: owner,
                });
            }
            owners.insert(id.clone(), owner);
            tags.insert(descriptor.tag().to_string());

            let path = descriptor.public_path(&settings.prefix);
            let item = paths.entry(path.clone()).or_default();
            let slot = operation_slot(item, descriptor.verb);
            if slot.is_some() {
                return Err(DocsError::DuplicateRoute {
                    verb: descriptor.verb.as_str(),
                    path,
                });
            }
            *slot = Some(build_operation(descriptor, id, &route.schema));
        }

        let spec = OpenApi {
            openapi: OPENAPI_VERSION.to_string(),
            info: Info {
                title: self.title.clone(),
                version: self.version.clone(),
                description: None,
            },
            paths,
            components: Some(Components {
                security_schemes: BTreeMap::from([(
                    BEARER_SCHEME.to_string(),
                    SecurityScheme::bearer_jwt(),
                )]),
            }),
            tags: tags.into_iter().map(|name| Tag { name }).collect(),
        };

        let json = Bytes::from(serde_json::to_vec(&spec)?);
        let html = Bytes::from(
            SwaggerUi::new(&self.title, SWAGGER_JSON_PATH)
                .doc_expansion(DocExpansion::None)
                .display_operation_id(true)
                .html(),
        );

        debug!(
            operations = owners.len(),
            bytes = json.len(),
            "API document composed"
        );

        Ok(ApiDocument { spec, json, html })
    }
}

fn operation_slot(item: &mut PathItem, verb: Verb) -> &mut Option<Operation> {
    match verb {
        Verb::Get => &mut item.get,
        Verb::Post => &mut item.post,
        Verb::Put => &mut item.put,
        Verb::Patch => &mut item.patch,
        Verb::Delete => &mut item.delete,
        Verb::Options => &mut item.options,
        Verb::Head => &mut item.head,
    }
}

/// Path template variables, e.g. `id` for `/users/{id}`.
fn path_variables(path: &str) -> Vec<&str> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
        .map(|name| name.trim_start_matches('*'))
        .collect()
}

fn build_operation(descriptor: &RouteDescriptor, id: String, schema: &RouteSchema) -> Operation {
    let mut parameters: Vec<Parameter> = path_variables(&descriptor.path)
        .into_iter()
        .map(|name| Parameter {
            name: name.to_string(),
            location: ParameterIn::Path,
            required: true,
            schema: Schema::primitive(
                schema
                    .params
                    .rule(name)
                    .map_or("string", |rule| rule.kind.type_name()),
            ),
        })
        .collect();

    parameters.extend(schema.query.fields().iter().map(|rule| Parameter {
        name: rule.name.clone(),
        location: ParameterIn::Query,
        required: rule.required,
        schema: Schema::primitive(rule.kind.type_name()),
    }));

    let request_body = match &schema.body {
        BodySchema::Empty => None,
        BodySchema::Json(fields) => Some(RequestBody {
            required: fields.fields().iter().any(|rule| rule.required),
            content: BTreeMap::from([(
                "application/json".to_string(),
                MediaType {
                    schema: object_schema(fields),
                },
            )]),
        }),
        BodySchema::Multipart => Some(RequestBody {
            required: true,
            content: BTreeMap::from([(
                "multipart/form-data".to_string(),
                MediaType {
                    schema: Schema {
                        schema_type: "object".to_string(),
                        properties: BTreeMap::from([("file".to_string(), Schema::binary())]),
                        ..Schema::default()
                    },
                },
            )]),
        }),
    };

    let status = match descriptor.verb {
        Verb::Post => "201",
        _ => "200",
    };

    Operation {
        operation_id: id,
        summary: descriptor.summary.clone(),
        tags: vec![descriptor.tag().to_string()],
        parameters,
        request_body,
        responses: BTreeMap::from([(
            status.to_string(),
            Response {
                description: String::new(),
            },
        )]),
        security: Vec::new(),
    }
}

fn object_schema(fields: &PayloadSchema) -> Schema {
    Schema {
        schema_type: "object".to_string(),
        format: None,
        properties: fields
            .fields()
            .iter()
            .map(|rule| (rule.name.clone(), Schema::primitive(rule.kind.type_name())))
            .collect(),
        required: fields
            .fields()
            .iter()
            .filter(|rule| rule.required)
            .map(|rule| rule.name.clone())
            .collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::validation::{FieldRule, ValueKind};

    async fn noop() {}

    fn registry() -> RouteRegistry<()> {
        RouteRegistry::new()
            .register(
                RouteDescriptor::new("UserController", "findAllActive", Verb::Get, "/users", 1),
                RouteSchema::new().query(
                    PayloadSchema::new().field(FieldRule::optional("limit", ValueKind::Integer)),
                ),
                noop,
            )
            .register(
                RouteDescriptor::new("UserController", "update", Verb::Patch, "/users/{id}", 2),
                RouteSchema::new()
                    .params(
                        PayloadSchema::new().field(FieldRule::required("id", ValueKind::Integer)),
                    )
                    .json_body(
                        PayloadSchema::new()
                            .field(FieldRule::required("name", ValueKind::String))
                            .field(FieldRule::optional("admin", ValueKind::Boolean)),
                    ),
                noop,
            )
    }

    #[test]
    fn test_document_header() {
        let doc = DocumentationComposer::new()
            .build(&registry(), &PipelineSettings::default())
            .unwrap();
        let spec = doc.spec();

        assert_eq!(spec.openapi, "3.0.0");
        assert_eq!(spec.info.title, "API Gateway microservices");
        assert_eq!(spec.info.version, "1.0");

        let scheme = &spec.components.as_ref().unwrap().security_schemes["bearer"];
        assert_eq!(scheme.scheme_type, "http");
        assert_eq!(scheme.scheme, "bearer");
        assert_eq!(scheme.bearer_format, "JWT");
    }

    #[test]
    fn test_paths_are_prefixed_and_versioned() {
        let doc = DocumentationComposer::new()
            .build(&registry(), &PipelineSettings::default())
            .unwrap();
        let paths: Vec<&String> = doc.spec().paths.keys().collect();

        assert_eq!(paths, vec!["/api/v2/v1/users", "/api/v2/v2/users/{id}"]);
    }

    #[test]
    fn test_operations_carry_ids_parameters_and_bodies() {
        let doc = DocumentationComposer::new()
            .build(&registry(), &PipelineSettings::default())
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(doc.json()).unwrap();

        let list = &json["paths"]["/api/v2/v1/users"]["get"];
        assert_eq!(list["operationId"], "userFindAllActive");
        assert_eq!(list["tags"][0], "User");
        assert_eq!(list["parameters"][0]["in"], "query");
        assert_eq!(list["parameters"][0]["schema"]["type"], "integer");
        assert!(list["responses"]["200"].is_object());

        let update = &json["paths"]["/api/v2/v2/users/{id}"]["patch"];
        assert_eq!(update["operationId"], "userUpdate");
        assert_eq!(update["parameters"][0]["in"], "path");
        assert_eq!(update["parameters"][0]["required"], true);
        let body = &update["requestBody"]["content"]["application/json"]["schema"];
        assert_eq!(body["required"], serde_json::json!(["name"]));
        assert_eq!(body["properties"]["admin"]["type"], "boolean");
    }

    #[test]
    fn test_composition_is_deterministic() {
        let settings = PipelineSettings::default();
        let a = DocumentationComposer::new().build(&registry(), &settings).unwrap();
        let b = DocumentationComposer::new().build(&registry(), &settings).unwrap();

        assert_eq!(a.json(), b.json());
    }

    #[test]
    fn test_duplicate_operation_id_is_rejected() {
        let registry = registry().register(
            RouteDescriptor::new("UserController", "findAllActive", Verb::Get, "/people", 1),
            RouteSchema::new(),
            noop,
        );
        let err = DocumentationComposer::new()
            .build(&registry, &PipelineSettings::default())
            .unwrap_err();

        assert!(matches!(err, DocsError::DuplicateOperationId { ref operation_id, .. } if operation_id == "userFindAllActive"));
    }

    #[test]
    fn test_path_variables() {
        assert_eq!(path_variables("/users/{id}/posts/{postId}"), vec!["id", "postId"]);
        assert_eq!(path_variables("/files/{*rest}"), vec!["rest"]);
        assert!(path_variables("/health").is_empty());
    }
}
