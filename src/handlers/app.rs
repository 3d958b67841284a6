//! Root endpoint.

/// `GET /api/v2/v1/` greeting.
pub async fn get_hello() -> &'static str {
    "Hello World!"
}
