//! Authentication API endpoints.
//!
//! - POST `/register` - Create an account
//! - POST `/login` - Exchange credentials for a token pair
//! - POST `/refresh` - Exchange a refresh token for a new pair
//! - POST `/logout` - Revoke the current session and clear cookies

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::error::{ApiError, validate_email, validate_name, validate_password};
use crate::auth::{
    ACCESS_COOKIE_NAME, AuthState, Authenticated, REFRESH_COOKIE_NAME, append_clear_cookies,
    get_cookie, require_session, token_cookie,
};
use crate::jwt::TokenPurpose;
use crate::rate_limit::{
    RateLimitConfig, rate_limit_login, rate_limit_refresh, rate_limit_register,
};
use crate::service::{LoginTokens, Registration};

pub fn router(state: AuthState, rate_limits: Arc<RateLimitConfig>) -> Router {
    let register_router = Router::new()
        .route("/register", post(register))
        .layer(middleware::from_fn_with_state(
            rate_limits.clone(),
            rate_limit_register,
        ));

    let login_router = Router::new()
        .route("/login", post(login))
        .layer(middleware::from_fn_with_state(
            rate_limits.clone(),
            rate_limit_login,
        ));

    let refresh_router = Router::new()
        .route("/refresh", post(refresh))
        .layer(middleware::from_fn_with_state(rate_limits, rate_limit_refresh));

    let logout_router = Router::new()
        .route("/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .merge(register_router)
        .merge(login_router)
        .merge(refresh_router)
        .merge(logout_router)
        .with_state(state)
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    name: String,
    password: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    id: i64,
    email: String,
    name: String,
}

async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_email(&payload.email)?;
    validate_name(&payload.name)?;
    validate_password(&payload.password)?;

    let principal = state
        .service
        .register(Registration {
            email: payload.email,
            name: payload.name.trim().to_string(),
            password: payload.password,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: principal.id,
            email: principal.email,
            name: principal.name,
        }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Access token expiry (Unix seconds)
    exp: u64,
}

/// Return the pair in the body and as HttpOnly cookies.
fn token_response(state: &AuthState, tokens: LoginTokens) -> Response {
    let tokens_issuer = state.service.tokens();
    let access_cookie = token_cookie(
        ACCESS_COOKIE_NAME,
        &tokens.access_token,
        tokens_issuer.lifetime(TokenPurpose::Access).as_secs(),
        state.secure_cookies,
    );
    let refresh_cookie = token_cookie(
        REFRESH_COOKIE_NAME,
        &tokens.refresh_token,
        tokens_issuer.lifetime(TokenPurpose::Refresh).as_secs(),
        state.secure_cookies,
    );

    (
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, access_cookie), (SET_COOKIE, refresh_cookie)]),
        Json(TokenResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            exp: tokens.access_expires_at,
        }),
    )
        .into_response()
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let tokens = state
        .service
        .login(&payload.email, &payload.password)
        .await?;

    Ok(token_response(&state, tokens))
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

/// Refresh with the token from the JSON body, or from the cookie when the
/// body is empty.
async fn refresh(
    State(state): State<AuthState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let refresh_token = if body.is_empty() {
        get_cookie(&headers, REFRESH_COOKIE_NAME)
            .map(str::to_string)
            .ok_or_else(|| ApiError::unauthorized("No refresh token"))?
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .map_err(|e| {
                debug!(error = %e, "Malformed refresh request");
                ApiError::bad_request("Malformed request body")
            })?
            .refresh_token
    };

    let tokens = state.service.refresh(&refresh_token).await?;
    Ok(token_response(&state, tokens))
}

async fn logout(
    State(state): State<AuthState>,
    Authenticated(principal): Authenticated,
) -> Result<Response, ApiError> {
    state.service.logout(principal.id).await?;

    let mut response = Json(serde_json::json!({ "success": true })).into_response();
    append_clear_cookies(response.headers_mut(), state.secure_cookies);
    Ok(response)
}
