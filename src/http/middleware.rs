//! Admission middleware: per-client rate limiting in front of every route.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, info, trace, warn};

use crate::config::{FailureMode, RateLimitingConfig};
use crate::ratelimit::{identifier, CounterStore, RateLimitDecision, RateLimiter};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Static admission rules.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    /// Requests allowed per window
    pub limit: u64,
    /// Window length in seconds
    pub window_seconds: u64,
    /// Path prefixes that bypass rate limiting entirely
    pub exempt_path_prefixes: Vec<String>,
    /// Behaviour when the store errors during evaluation
    pub failure_mode: FailureMode,
}

impl AdmissionPolicy {
    fn is_exempt(&self, path: &str) -> bool {
        self.exempt_path_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl From<&RateLimitingConfig> for AdmissionPolicy {
    fn from(config: &RateLimitingConfig) -> Self {
        Self {
            limit: config.limit,
            window_seconds: config.window_seconds,
            exempt_path_prefixes: config.exempt_path_prefixes.clone(),
            failure_mode: config.failure_mode,
        }
    }
}

/// State shared by every invocation of [`admission_middleware`].
///
/// The limiter slot is empty while no counter store is configured or
/// reachable, in which case every request is admitted without enforcement.
/// Clones share the slot, so a store connected after startup takes effect
/// for the running router.
#[derive(Debug, Clone)]
pub struct AdmissionState {
    limiter: Arc<RwLock<Option<RateLimiter>>>,
    policy: Arc<AdmissionPolicy>,
}

impl AdmissionState {
    pub fn new(limiter: Option<RateLimiter>, policy: AdmissionPolicy) -> Self {
        Self {
            limiter: Arc::new(RwLock::new(limiter)),
            policy: Arc::new(policy),
        }
    }

    /// Build the state from configuration and an optional, already connected store.
    pub fn from_config(config: &RateLimitingConfig, store: Option<Arc<dyn CounterStore>>) -> Self {
        let limiter = store.map(|store| RateLimiter::from_config(store, config));
        Self::new(limiter, AdmissionPolicy::from(config))
    }

    /// Start enforcing with `limiter`, replacing any previous one.
    pub fn install_limiter(&self, limiter: RateLimiter) {
        *self.limiter.write() = Some(limiter);
        info!("Rate limiting enabled");
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// The current limiter, cloned out so no lock is held across a store call.
    pub fn limiter(&self) -> Option<RateLimiter> {
        self.limiter.read().clone()
    }
}

/// Rate limiting middleware run before routing.
///
/// Exempt paths and deployments without a store pass straight through. Store
/// faults follow the configured [`FailureMode`]. Over-limit requests get a
/// 429; admitted responses gain `X-RateLimit-*` headers unless the handler
/// already set them.
pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    request: Request,
    next: Next,
) -> Response {
    let policy = state.policy();

    if policy.is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let Some(limiter) = state.limiter() else {
        return next.run(request).await;
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let ident = identifier::resolve(request.headers(), peer);

    let decision = match limiter
        .evaluate(&ident, policy.limit, policy.window_seconds)
        .await
    {
        Ok(decision) => decision,
        Err(e) => match policy.failure_mode {
            FailureMode::FailOpen => {
                warn!(error = %e, "Counter store error, admitting request without rate limiting");
                return next.run(request).await;
            }
            FailureMode::FailClosed => {
                warn!(error = %e, "Counter store error, rejecting request");
                return unavailable_response();
            }
        },
    };

    trace!(
        key = %limiter.key_for(&ident).redacted(),
        count = decision.current_count,
        limit = decision.limit,
        "Rate limit evaluated"
    );

    if !decision.allowed {
        warn!(
            path = %request.uri().path(),
            count = decision.current_count,
            limit = decision.limit,
            "Rate limit exceeded, rejecting request"
        );
        return rejection_response(&decision);
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    debug!(remaining = decision.remaining(), "Request admitted");
    response
}

/// Add rate limit headers, keeping any value a handler already set.
fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers
        .entry(X_RATELIMIT_LIMIT)
        .or_insert_with(|| HeaderValue::from(decision.limit));
    headers
        .entry(X_RATELIMIT_REMAINING)
        .or_insert_with(|| HeaderValue::from(decision.remaining()));
    headers
        .entry(X_RATELIMIT_RESET)
        .or_insert_with(|| HeaderValue::from(decision.reset_after()));
}

fn rejection_response(decision: &RateLimitDecision) -> Response {
    let body = json!({
        "status": "error",
        "error": {
            "code": "RATE_LIMIT_EXCEEDED",
            "message": "Too many requests",
            "details": format!(
                "Allowed {} per {} seconds",
                decision.limit, decision.window_seconds
            ),
            "reset_at": decision.reset_at,
        },
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u64));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_after()));
    response
}

fn unavailable_response() -> Response {
    let body = json!({
        "status": "error",
        "error": {
            "code": "RATE_LIMIT_UNAVAILABLE",
            "message": "Rate limiting temporarily unavailable",
        },
    });
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}
