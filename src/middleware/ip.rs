//! Client IP extraction for per-client throttling.
//!
//! # Priority
//!
//! 1. `X-Forwarded-For` (first address in the list)
//! 2. `X-Real-IP`
//! 3. The peer address recorded by the server (`ConnectInfo<SocketAddr>`)
//! 4. [`UNKNOWN_IP`]
//!
//! # Security Warning: IP Spoofing Risk
//!
//! Forwarding headers are client-provided. Deploy behind a reverse proxy that
//! overwrites them, otherwise a client can rotate spoofed addresses to escape
//! throttling.
//!
//! ## The "unknown" Fallback
//!
//! Requests with no identifiable address share the `"unknown"` key and are
//! throttled collectively.

use std::borrow::Cow;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;

/// Fallback key when no client IP can be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// Where the address came from, for debug logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpSource {
    ForwardedFor,
    RealIp,
    Peer,
    Unknown,
}

/// Extract the client IP and its source.
///
/// Returns `Cow<'static, str>`: borrowed for the "unknown" fallback, owned
/// for actual addresses.
#[inline]
pub fn extract_client_ip<B>(req: &Request<B>) -> (Cow<'static, str>, IpSource) {
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first_ip) = value.split(',').next()
        && !first_ip.trim().is_empty()
    {
        return (Cow::Owned(first_ip.trim().to_string()), IpSource::ForwardedFor);
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return (Cow::Owned(value.trim().to_string()), IpSource::RealIp);
    }

    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return (Cow::Owned(addr.ip().to_string()), IpSource::Peer);
    }

    (Cow::Borrowed(UNKNOWN_IP), IpSource::Unknown)
}
