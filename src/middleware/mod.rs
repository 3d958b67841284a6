//! HTTP middleware making up the request pipeline.
//!
//! # Architecture
//!
//! ```text
//! Request → Request ID/Trace → CORS → Compression → Security Headers
//!         → Throttle → Versioning → Prefix → Payload Validation → Multipart → Handler
//!                ↓          ↓          ↓             ↓                ↓
//!               429        404        404        400/413/415       400/413
//! ```
//!
//! The global stages are tower layers; payload validation and multipart
//! handling are `axum::middleware::from_fn_with_state` route layers because
//! they depend on the matched route. See [`crate::pipeline`] for composition.
//!
//! # Security Considerations
//!
//! - Throttling keys on the client IP; forwarding headers are trusted
//! - Unknown payload fields are rejected, never silently dropped
//! - Body and part sizes are bounded while streaming

pub mod cors;
pub mod ip;
pub mod multipart;
pub mod payload;
pub mod prefix;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod versioning;

pub use cors::CorsPolicy;
pub use ip::{UNKNOWN_IP, extract_client_ip};
pub use multipart::{UploadLimits, UploadedPart, UploadedParts, handle_multipart};
pub use payload::{PayloadPolicy, validate_payload};
pub use prefix::PrefixLayer;
pub use rate_limit::{RateLimitError, RateLimitLayer};
pub use request_id::{MakeRequestUuidV4, REQUEST_ID_HEADER, RequestIdExt, make_request_span};
pub use security_headers::{SECURITY_HEADERS, with_security_headers};
pub use versioning::{ApiVersion, VersioningLayer};
