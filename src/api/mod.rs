mod auth;
mod error;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::auth::AuthState;
use crate::rate_limit::RateLimitConfig;

pub use error::{
    ApiError, MIN_NAME_LENGTH, MIN_PASSWORD_LENGTH, validate_email, validate_name,
    validate_password,
};

/// Create the API router.
pub fn create_api_router(state: AuthState, rate_limits: Arc<RateLimitConfig>) -> Router {
    Router::new()
        .nest("/auth", auth::router(state.clone(), rate_limits))
        .nest("/users", users::router(state))
}
