//! Multipart upload stage.
//!
//! `multipart/form-data` bodies are parsed with `multer` while streaming, so
//! each ceiling in [`UploadLimits`] is enforced before an oversized part is
//! buffered.
//! Parsed parts reach handlers as an [`UploadedParts`] request extension and
//! the body is replaced by an empty one.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use multer::{Constraints, Field, Multipart, SizeLimit};
use tracing::debug;

use crate::error::RequestRejection;
use crate::pipeline::Stage;
use crate::validation::{UPLOAD_BODY_LIMIT, UPLOAD_FIELD_LIMIT, UPLOAD_MAX_PARTS, UPLOAD_PART_LIMIT};

/// One field of a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedPart {
    pub field_name: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// All parts of a multipart request, in body order.
#[derive(Debug, Clone, Default)]
pub struct UploadedParts(pub Vec<UploadedPart>);

impl UploadedParts {
    pub fn iter(&self) -> impl Iterator<Item = &UploadedPart> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&UploadedPart> {
        self.0
            .iter()
            .find(|part| part.field_name.as_deref() == Some(name))
    }
}

/// Multipart ceilings, used as route-layer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    /// Bytes per file part.
    pub file: usize,
    /// Bytes per part without a file name.
    pub field: usize,
    /// Parts per body.
    pub parts: usize,
    /// Bytes for the whole body.
    pub body: usize,
}

impl UploadLimits {
    /// Default field, part count and body ceilings with `file` bytes per
    /// file part. The body ceiling always fits one full file part.
    pub fn new(file: usize) -> Self {
        Self {
            file,
            field: UPLOAD_FIELD_LIMIT,
            parts: UPLOAD_MAX_PARTS,
            body: UPLOAD_BODY_LIMIT.max(file.saturating_add(UPLOAD_FIELD_LIMIT)),
        }
    }

    pub fn with_field(mut self, field: usize) -> Self {
        self.field = field;
        self
    }

    pub fn with_parts(mut self, parts: usize) -> Self {
        self.parts = parts;
        self
    }

    pub fn with_body(mut self, body: usize) -> Self {
        self.body = body;
        self
    }

    fn constraints(&self) -> Constraints {
        Constraints::new().size_limit(
            SizeLimit::new()
                .whole_stream(self.body as u64)
                .per_field(self.file.max(self.field) as u64),
        )
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self::new(UPLOAD_PART_LIMIT)
    }
}

fn too_large(message: &'static str, detail: String) -> RequestRejection {
    RequestRejection::new(Stage::Multipart, StatusCode::PAYLOAD_TOO_LARGE, message)
        .with_details(vec![detail])
}

fn part_too_large(field_name: Option<&str>, limit: usize) -> RequestRejection {
    too_large(
        "File too large",
        format!(
            "part {} exceeds the {limit} byte limit",
            field_name.unwrap_or("<unnamed>")
        ),
    )
}

fn map_multer_error(err: multer::Error, limits: &UploadLimits) -> RequestRejection {
    match err {
        multer::Error::FieldSizeExceeded { field_name, .. } => {
            part_too_large(field_name.as_deref(), limits.file)
        }
        multer::Error::StreamSizeExceeded { .. } => too_large(
            "Request body is too large",
            format!("multipart bodies are limited to {} bytes", limits.body),
        ),
        other => {
            debug!(error = %other, "Rejecting malformed multipart body");
            RequestRejection::new(
                Stage::Multipart,
                StatusCode::BAD_REQUEST,
                "Malformed multipart body",
            )
        }
    }
}

/// Read one part, enforcing the ceiling for its kind while streaming.
async fn read_part(
    mut field: Field<'static>,
    limits: &UploadLimits,
) -> Result<UploadedPart, RequestRejection> {
    let field_name = field.name().map(str::to_string);
    let file_name = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(ToString::to_string);
    let limit = if file_name.is_some() {
        limits.file
    } else {
        limits.field
    };

    let mut data = BytesMut::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|err| map_multer_error(err, limits))?
    {
        if data.len() + chunk.len() > limit {
            return Err(if file_name.is_some() {
                part_too_large(field_name.as_deref(), limit)
            } else {
                too_large(
                    "Field value too large",
                    format!(
                        "field {} exceeds the {limit} byte limit",
                        field_name.as_deref().unwrap_or("<unnamed>")
                    ),
                )
            });
        }
        data.extend_from_slice(&chunk);
    }

    Ok(UploadedPart {
        field_name,
        file_name,
        content_type,
        data: data.freeze(),
    })
}

async fn collect_parts(
    mut multipart: Multipart<'static>,
    limits: &UploadLimits,
) -> Result<Vec<UploadedPart>, RequestRejection> {
    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| map_multer_error(err, limits))?
    {
        if parts.len() == limits.parts {
            return Err(too_large(
                "Too many parts",
                format!("multipart bodies are limited to {} parts", limits.parts),
            ));
        }
        parts.push(read_part(field, limits).await?);
    }
    Ok(parts)
}

/// Parse a multipart body into [`UploadedParts`].
///
/// Requests with any other content type pass through unchanged.
pub async fn handle_multipart(
    State(limits): State<UploadLimits>,
    request: Request,
    next: Next,
) -> Response {
    let boundary = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|content_type| multer::parse_boundary(content_type).ok());

    let Some(boundary) = boundary else {
        return next.run(request).await;
    };

    let (mut parts, body) = request.into_parts();

    let multipart =
        Multipart::with_constraints(body.into_data_stream(), boundary, limits.constraints());

    let uploaded = match collect_parts(multipart, &limits).await {
        Ok(uploaded) => uploaded,
        Err(rejection) => return rejection.into_response(),
    };

    debug!(parts = uploaded.len(), "Parsed multipart body");

    parts.extensions.insert(UploadedParts(uploaded));
    parts.headers.remove(header::CONTENT_LENGTH);

    next.run(Request::from_parts(parts, Body::empty())).await
}
