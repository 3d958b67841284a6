//! Per-client request throttling.
//!
//! # Algorithm
//!
//! Uses the Governor crate's Generic Cell Rate Algorithm (GCRA). The window
//! configured by `THROTTLE_TTL` admits `THROTTLE_LIMIT` requests per client:
//! the bucket holds `limit` cells and refills one cell every `ttl / limit`.
//! A client that spends its whole allowance at once waits for cells to drip
//! back in rather than for the window to reset.
//!
//! # Response Headers
//!
//! On throttle (429):
//! - `Retry-After`: Seconds until the next request will be accepted
//! - `X-RateLimit-Limit`: Requests admitted per window
//! - `X-RateLimit-Remaining`: Always `0`
//!
//! Clients are keyed by [`super::ip::extract_client_ip`].
//!
//! # Memory
//!
//! Every distinct key gets an entry in the limiter's map, and forwarding
//! headers let a client pick its own key. Once per window a background task
//! prunes entries whose bucket has fully refilled, so the map only holds
//! clients seen within the last `THROTTLE_TTL`. The task stops when the last
//! layer handle is dropped.

use std::num::NonZeroU32;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tower::{Layer, Service};
use tracing::{debug, trace, warn};

use super::ip::extract_client_ip;
use crate::config::ThrottleSettings;
use crate::error::RequestRejection;
use crate::pipeline::Stage;

/// Error type for throttle layer configuration.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// The window admits no requests at all.
    #[error("throttle limit must be greater than 0")]
    ZeroLimit,
    /// The window is shorter than one refill tick.
    #[error("throttle window is too short for the configured limit")]
    ZeroWindow,
}

/// Type alias for per-IP rate limiter.
///
/// Uses `String` keys (IP addresses) with the default DashMap-based state store.
type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Throttling layer for the outer pipeline.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<KeyedLimiter>,
    /// Requests per window (for headers)
    limit: u32,
}

impl RateLimitLayer {
    /// Build a per-client limiter admitting `limit` requests every `ttl`.
    ///
    /// # Errors
    ///
    /// [`RateLimitError::ZeroLimit`] when `limit` is 0 and
    /// [`RateLimitError::ZeroWindow`] when `ttl / limit` rounds to zero.
    pub fn new(settings: &ThrottleSettings) -> Result<Self, RateLimitError> {
        let limit = NonZeroU32::new(settings.limit).ok_or(RateLimitError::ZeroLimit)?;

        let period = settings.ttl / limit.get();
        let quota = Quota::with_period(period)
            .ok_or(RateLimitError::ZeroWindow)?
            .allow_burst(limit);

        debug!(
            ttl_secs = settings.ttl.as_secs(),
            limit = limit.get(),
            "Throttle quota configured"
        );

        let limiter = Arc::new(RateLimiter::keyed(quota));
        spawn_pruning(&limiter, settings.ttl);

        Ok(Self {
            limiter,
            limit: limit.get(),
        })
    }

    /// Number of client keys currently held.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Drop every key whose bucket has fully refilled.
    pub fn prune(&self) {
        prune(&self.limiter);
    }
}

fn prune(limiter: &KeyedLimiter) {
    let before = limiter.len();
    limiter.retain_recent();
    limiter.shrink_to_fit();
    trace!(before, after = limiter.len(), "Pruned throttle keys");
}

/// Prune `limiter` every `every` until it is dropped.
///
/// Outside a Tokio runtime nothing is spawned; [`RateLimitLayer::prune`]
/// still works.
fn spawn_pruning(limiter: &Arc<KeyedLimiter>, every: Duration) {
    let Ok(handle) = Handle::try_current() else {
        debug!("No runtime, throttle keys are not pruned in the background");
        return;
    };
    let limiter: Weak<KeyedLimiter> = Arc::downgrade(limiter);

    handle.spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(limiter) = limiter.upgrade() else {
                break;
            };
            prune(&limiter);
        }
    });
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            limit: self.limit,
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<KeyedLimiter>,
    limit: u32,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let limit = self.limit;
        let mut inner = self.inner.clone();

        let (client_ip, source) = extract_client_ip(&req);
        let client_ip = client_ip.into_owned();

        Box::pin(async move {
            match limiter.check_key(&client_ip) {
                Ok(_) => inner.call(req).await,
                Err(not_until) => {
                    let wait_time = not_until.wait_time_from(DefaultClock::default().now());
                    let retry_after = wait_time.as_secs().max(1);

                    warn!(
                        client_ip = %client_ip,
                        ip_source = ?source,
                        path = %req.uri().path(),
                        retry_after_secs = retry_after,
                        "Throttle limit exceeded"
                    );

                    let mut response = RequestRejection::new(
                        Stage::Throttle,
                        StatusCode::TOO_MANY_REQUESTS,
                        "Too many requests. Please retry later.",
                    )
                    .into_response();

                    let headers = response.headers_mut();
                    headers.insert("retry-after", HeaderValue::from(retry_after));
                    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
                    headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));

                    Ok(response)
                }
            }
        })
    }
}
