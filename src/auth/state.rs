//! State shared by the session middleware and the API handlers.

use crate::db::UserStore;
use crate::service::AuthService;
use crate::session::SessionBackend;

/// The auth service as wired into the server.
pub type SessionService = AuthService<UserStore, SessionBackend>;

#[derive(Clone)]
pub struct AuthState {
    pub service: SessionService,
    /// Whether to set the Secure flag on token cookies
    pub secure_cookies: bool,
}

impl AuthState {
    pub fn new(service: SessionService, secure_cookies: bool) -> Self {
        Self {
            service,
            secure_cookies,
        }
    }
}
