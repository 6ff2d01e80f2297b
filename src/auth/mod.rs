//! Session authentication for API routes.
//!
//! Protected routes run behind [`require_session`]: the access token is read
//! from the `Authorization: Bearer` header or the `access_token` cookie,
//! verified with the access secret, and checked against the principal's
//! session record. Every caller-caused failure produces the same 401.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, append_clear_cookies, clear_cookie, get_cookie,
    token_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{Authenticated, access_token, require_session};
pub use ip::{FORWARDED_FOR_HEADER, HasHeadersAndExtensions, extract_client_ip};
pub use state::{AuthState, SessionService};
