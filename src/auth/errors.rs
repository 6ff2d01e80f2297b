//! Session middleware rejections.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::cookie::append_clear_cookies;
use crate::service::AuthError;

/// Why a protected request was turned away.
///
/// Every caller-caused failure maps to the same 401 body; the distinction is
/// only visible in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No access token in the Authorization header or cookie
    NotAuthenticated,
    /// Bad signature, expired, or wrong token type
    InvalidToken,
    /// No session record or the record names a different pair
    SessionInvalid,
    /// The principal no longer exists
    PrincipalInvalid,
    /// A backing store failed or timed out
    StoreUnavailable,
    /// The route was mounted without the session middleware
    Internal,
}

/// API authentication error (returns JSON and clears cookies on 401).
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
    pub(super) secure_cookies: bool,
}

impl ApiAuthError {
    pub(super) fn new(kind: AuthErrorKind, secure_cookies: bool) -> Self {
        Self {
            kind,
            secure_cookies,
        }
    }

    pub(super) fn from_auth_error(error: AuthError, secure_cookies: bool) -> Self {
        let kind = match error {
            AuthError::SessionInvalid => AuthErrorKind::SessionInvalid,
            AuthError::PrincipalInvalid => AuthErrorKind::PrincipalInvalid,
            AuthError::StoreUnavailable => AuthErrorKind::StoreUnavailable,
            AuthError::InvalidCredentials | AuthError::AlreadyExists => {
                AuthErrorKind::NotAuthenticated
            }
            AuthError::PersistenceFailed | AuthError::CredentialHashing | AuthError::TokenSigning => {
                AuthErrorKind::Internal
            }
        };
        Self::new(kind, secure_cookies)
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NotAuthenticated
            | AuthErrorKind::InvalidToken
            | AuthErrorKind::SessionInvalid
            | AuthErrorKind::PrincipalInvalid => StatusCode::UNAUTHORIZED,
            AuthErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.status_code() {
            StatusCode::UNAUTHORIZED => "Not authorized",
            StatusCode::SERVICE_UNAVAILABLE => "Service unavailable",
            _ => "Internal error",
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let status = self.status_code();
        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        // A store outage says nothing about the cookies, keep them
        if status == StatusCode::UNAUTHORIZED {
            append_clear_cookies(response.headers_mut(), self.secure_cookies);
        }

        response
    }
}
