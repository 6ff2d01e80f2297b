//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force attacks.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::debug;

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

const LOGIN_PER_SEC: NonZeroU32 = NonZeroU32::new(1).unwrap();
const LOGIN_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();
const REFRESH_PER_MIN: NonZeroU32 = NonZeroU32::new(30).unwrap();
const REGISTER_PER_MIN: NonZeroU32 = NonZeroU32::new(3).unwrap();

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for login (strict: 5 requests burst, 1 per second)
    pub login: Option<Arc<IpLimiter>>,
    /// Per-IP limiter for token refresh (30 requests per minute)
    pub refresh: Option<Arc<IpLimiter>>,
    /// Per-IP limiter for registration (strict: 3 requests per minute)
    pub register: Option<Arc<IpLimiter>>,
    /// Take the client IP from `X-Forwarded-For` instead of the connection
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    /// Create rate limiters with the default quotas.
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self {
            login: Some(Arc::new(RateLimiter::keyed(
                Quota::per_second(LOGIN_PER_SEC).allow_burst(LOGIN_BURST),
            ))),
            refresh: Some(Arc::new(RateLimiter::keyed(Quota::per_minute(
                REFRESH_PER_MIN,
            )))),
            register: Some(Arc::new(RateLimiter::keyed(Quota::per_minute(
                REGISTER_PER_MIN,
            )))),
            trust_forwarded_for,
        }
    }

    /// No limits. Client IPs are not required.
    pub fn unlimited() -> Self {
        Self {
            login: None,
            refresh: None,
            register: None,
            trust_forwarded_for: false,
        }
    }
}

async fn check(
    limiter: Option<&IpLimiter>,
    trust_forwarded_for: bool,
    message: &'static str,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = limiter else {
        return next.run(request).await;
    };

    let ip = match extract_client_ip(&request, trust_forwarded_for) {
        Ok(ip) => ip,
        Err(e) => {
            debug!(error = e, "Unable to determine client IP");
            return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
        }
    };

    match limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            debug!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
            (StatusCode::TOO_MANY_REQUESTS, message).into_response()
        }
    }
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        config.login.as_deref(),
        config.trust_forwarded_for,
        "Too many login attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting token refresh.
pub async fn rate_limit_refresh(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        config.refresh.as_deref(),
        config.trust_forwarded_for,
        "Too many requests. Please try again later.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        config.register.as_deref(),
        config.trust_forwarded_for,
        "Too many signup attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}
