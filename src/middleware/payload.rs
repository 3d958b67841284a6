//! Payload validation stage.
//!
//! Runs as a route layer so it can see the route's [`RouteSchema`]. Path
//! parameters, the query string and a JSON body are validated and coerced
//! together; all violations are reported in one 400 response. On success the
//! coerced JSON replaces the original body.
//!
//! Multipart bodies are left for the multipart stage.

use std::error::Error as _;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{RawPathParams, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{RequestRejection, sanitize_serde_error};
use crate::pipeline::Stage;
use crate::validation::{BodySchema, PayloadSchema, RouteSchema, query_to_object, validate_fields};

/// Route-layer state: the route's schema plus the JSON size ceiling.
#[derive(Debug, Clone)]
pub struct PayloadPolicy {
    pub schema: Arc<RouteSchema>,
    pub json_limit: usize,
}

fn rejection(status: StatusCode, message: impl Into<String>) -> RequestRejection {
    RequestRejection::new(Stage::PayloadValidation, status, message)
}

/// `true` for `multipart/form-data` requests.
pub fn is_multipart(headers: &HeaderMap) -> bool {
    content_type(headers).is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

fn is_json(headers: &HeaderMap) -> bool {
    content_type(headers).is_some_and(|ct| {
        let essence = ct.split(';').next().unwrap_or_default().trim();
        essence == "application/json" || essence.ends_with("+json")
    })
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_ascii_lowercase)
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

async fn read_body(body: Body, limit: usize) -> Result<Bytes, RequestRejection> {
    axum::body::to_bytes(body, limit).await.map_err(|err| {
        let mut source = err.source();
        while let Some(cause) = source {
            if cause.is::<LengthLimitError>() {
                return payload_too_large(limit);
            }
            source = cause.source();
        }
        rejection(StatusCode::BAD_REQUEST, "Failed to read request body")
    })
}

fn payload_too_large(limit: usize) -> RequestRejection {
    rejection(StatusCode::PAYLOAD_TOO_LARGE, "Request body is too large")
        .with_details(vec![format!("JSON bodies are limited to {limit} bytes")])
}

/// Validate one request against its route schema.
pub async fn validate_payload(
    State(policy): State<PayloadPolicy>,
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
    next: Next,
) -> Response {
    let schema = &policy.schema;
    let mut violations = Vec::new();

    // Path parameters are fixed by the route pattern, so only declared ones
    // are checked.
    if let Ok(params) = &params {
        let input: Map<String, Value> = params
            .iter()
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect();
        if let Err(mut errors) = validate_fields(&schema.params, input, true) {
            violations.append(&mut errors);
        }
    }

    let query = match request.uri().query().map(query_to_object).transpose() {
        Ok(query) => query.unwrap_or_default(),
        Err(message) => return rejection(StatusCode::BAD_REQUEST, message).into_response(),
    };
    if let Err(mut errors) = validate_fields(&schema.query, query, false) {
        violations.append(&mut errors);
    }

    let (mut parts, body) = request.into_parts();

    let body = if is_multipart(&parts.headers) {
        if !matches!(schema.body, BodySchema::Multipart) {
            return rejection(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "Route does not accept multipart bodies",
            )
            .into_response();
        }
        Some(body)
    } else {
        if declared_length(&parts.headers).is_some_and(|len| len > policy.json_limit) {
            return payload_too_large(policy.json_limit).into_response();
        }

        let bytes = match read_body(body, policy.json_limit).await {
            Ok(bytes) => bytes,
            Err(rejection) => return rejection.into_response(),
        };

        match json_body(&schema.body, &parts.headers, &bytes) {
            Ok(None) => Some(Body::from(bytes)),
            Ok(Some(object)) => match validate_fields(body_fields(&schema.body), object, false) {
                Ok(coerced) => {
                    let encoded = serde_json::to_vec(&Value::Object(coerced)).unwrap_or_default();
                    parts
                        .headers
                        .insert(header::CONTENT_LENGTH, HeaderValue::from(encoded.len()));
                    Some(Body::from(encoded))
                }
                Err(mut errors) => {
                    violations.append(&mut errors);
                    None
                }
            },
            Err(rejection) => return rejection.into_response(),
        }
    };

    let Some(body) = body.filter(|_| violations.is_empty()) else {
        debug!(count = violations.len(), "Payload validation failed");
        return rejection(StatusCode::BAD_REQUEST, "Validation failed")
            .with_details(violations)
            .into_response();
    };

    next.run(Request::from_parts(parts, body)).await
}

fn body_fields(body: &BodySchema) -> &PayloadSchema {
    static NO_FIELDS: PayloadSchema = PayloadSchema::new();
    match body {
        BodySchema::Json(schema) => schema,
        BodySchema::Empty | BodySchema::Multipart => &NO_FIELDS,
    }
}

/// Parse the body into an object to validate.
///
/// `Ok(None)` means there is nothing to validate and the bytes are forwarded
/// unchanged: an empty body on a route without required body fields.
fn json_body(
    schema: &BodySchema,
    headers: &HeaderMap,
    bytes: &Bytes,
) -> Result<Option<Map<String, Value>>, RequestRejection> {
    if bytes.is_empty() {
        return Ok(match schema {
            BodySchema::Json(schema) if schema.fields().iter().any(|f| f.required) => {
                Some(Map::new())
            }
            _ => None,
        });
    }

    if matches!(schema, BodySchema::Multipart) {
        return Err(rejection(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected a multipart/form-data body",
        ));
    }

    if !is_json(headers) {
        return Err(rejection(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected an application/json body",
        ));
    }

    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(object)) => Ok(Some(object)),
        Ok(_) => Err(rejection(
            StatusCode::BAD_REQUEST,
            "Request body must be a JSON object",
        )),
        Err(e) => Err(rejection(StatusCode::BAD_REQUEST, sanitize_serde_error(&e))),
    }
}
