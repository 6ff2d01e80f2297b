//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::service::AuthError;

/// Minimum password length accepted at registration and password change.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Minimum display name length.
pub const MIN_NAME_LENGTH: usize = 3;

const MAX_FIELD_LENGTH: usize = 256;

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        if e.is_client_error() {
            debug!(error = %e, "Request rejected");
        } else {
            warn!(error = %e, "Request failed");
        }

        match e {
            AuthError::AlreadyExists => Self::Conflict(e.to_string()),
            AuthError::InvalidCredentials => Self::Unauthorized(e.to_string()),
            AuthError::SessionInvalid | AuthError::PrincipalInvalid => {
                Self::Unauthorized("Not authorized".into())
            }
            AuthError::StoreUnavailable => Self::ServiceUnavailable("Service unavailable".into()),
            AuthError::PersistenceFailed
            | AuthError::CredentialHashing
            | AuthError::TokenSigning => Self::Internal("Internal error".into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Validate the shape of an email address: one `@`, non-empty local part, a
/// dotted domain, no whitespace.
pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ApiError::bad_request("Email cannot be empty"));
    }
    if email.len() > MAX_FIELD_LENGTH {
        return Err(ApiError::bad_request("Email is too long"));
    }

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    Ok(())
}

/// Validate a plaintext password's length.
pub fn validate_password(password: &str) -> Result<(), ApiError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if password.len() > MAX_FIELD_LENGTH {
        return Err(ApiError::bad_request("Password is too long"));
    }
    Ok(())
}

/// Validate a display name's length.
pub fn validate_name(name: &str) -> Result<(), ApiError> {
    let length = name.trim().chars().count();
    if length < MIN_NAME_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Name must be at least {} characters",
            MIN_NAME_LENGTH
        )));
    }
    if name.len() > MAX_FIELD_LENGTH {
        return Err(ApiError::bad_request("Name is too long"));
    }
    Ok(())
}
