//! Session middleware and the extractor protected handlers read it through.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use super::cookie::{ACCESS_COOKIE_NAME, get_cookie};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::AuthState;
use crate::jwt::TokenPurpose;
use crate::principal::Principal;

/// Read the access token: `Authorization: Bearer` first, then the cookie.
pub fn access_token(headers: &HeaderMap) -> Option<&str> {
    bearer_token(headers).or_else(|| get_cookie(headers, ACCESS_COOKIE_NAME))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Middleware guarding protected routes.
///
/// Verifies the access token with the access secret, runs session validation,
/// then hands the principal to the handler as a request extension. On success
/// the session's idle TTL is extended on a detached task; the request does not
/// wait for it.
pub async fn require_session(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiAuthError> {
    let reject = |kind| ApiAuthError::new(kind, state.secure_cookies);

    let Some(token) = access_token(request.headers()) else {
        debug!("No access token presented");
        return Err(reject(AuthErrorKind::NotAuthenticated));
    };

    let claims = state
        .service
        .tokens()
        .verify(token, TokenPurpose::Access)
        .map_err(|e| {
            debug!(error = %e, "Rejected access token");
            reject(AuthErrorKind::InvalidToken)
        })?;

    let principal = state
        .service
        .validate_jwt(&claims.uid, claims.id, TokenPurpose::Access)
        .await
        .map_err(|e| ApiAuthError::from_auth_error(e, state.secure_cookies))?;

    state.service.extend_session(principal.id);

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Extractor for handlers mounted behind [`require_session`].
pub struct Authenticated(pub Principal);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Principal>() {
            Some(principal) => Ok(Authenticated(principal.clone())),
            None => {
                error!(path = %parts.uri.path(), "Protected handler reached without session middleware");
                Err(ApiAuthError::new(AuthErrorKind::Internal, false))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_preferred_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("access_token=from-cookie"),
        );

        assert_eq!(access_token(&headers), Some("from-header"));
    }

    #[test]
    fn test_cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("access_token=from-cookie"),
        );
        assert_eq!(access_token(&headers), Some("from-cookie"));

        // A non-bearer scheme does not shadow the cookie
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(access_token(&headers), Some("from-cookie"));
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer tok"));
        assert_eq!(access_token(&headers), Some("tok"));
    }

    #[test]
    fn test_no_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(access_token(&headers), None);
    }
}
