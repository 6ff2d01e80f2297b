//! Account endpoints for the signed-in principal. All routes require a session.
//!
//! - GET `/me` - Current account
//! - PUT `/me/password` - Change password (revokes the session)
//! - DELETE `/me` - Delete account (revokes the session)

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, validate_password};
use crate::auth::{AuthState, Authenticated, append_clear_cookies, require_session};

pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/me", get(me).delete(delete_account))
        .route("/me/password", put(change_password))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ))
        .with_state(state)
}

#[derive(Serialize)]
struct MeResponse {
    id: i64,
    email: String,
    name: String,
    created_at: String,
}

async fn me(Authenticated(principal): Authenticated) -> Json<MeResponse> {
    Json(MeResponse {
        id: principal.id,
        email: principal.email,
        name: principal.name,
        created_at: principal.created_at,
    })
}

#[derive(Deserialize)]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

/// Respond with no content and clear the token cookies.
fn signed_out(state: &AuthState) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    append_clear_cookies(response.headers_mut(), state.secure_cookies);
    response
}

async fn change_password(
    State(state): State<AuthState>,
    Authenticated(principal): Authenticated,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Response, ApiError> {
    validate_password(&payload.new_password)?;

    state
        .service
        .change_password(
            principal.id,
            &payload.current_password,
            &payload.new_password,
        )
        .await?;

    Ok(signed_out(&state))
}

async fn delete_account(
    State(state): State<AuthState>,
    Authenticated(principal): Authenticated,
) -> Result<Response, ApiError> {
    state.service.delete_account(principal.id).await?;
    Ok(signed_out(&state))
}
