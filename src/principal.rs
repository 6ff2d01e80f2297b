//! Principals (user accounts) and the store interface the auth core reads them through.

use std::future::Future;

/// A user account as held by the durable store.
#[derive(Clone)]
pub struct Principal {
    pub id: i64,
    /// Lower-cased email, unique among live accounts
    pub email: String,
    /// Display name
    pub name: String,
    /// PHC-formatted password digest, never the plaintext
    pub password_hash: String,
    pub created_at: String,
    pub updated_at: String,
    /// Soft-delete marker
    pub deleted_at: Option<String>,
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("password_hash", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("deleted_at", &self.deleted_at)
            .finish()
    }
}

/// Fields supplied when inserting a new principal.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

/// Durable lookup/insert/update of principals.
///
/// Lookups never return soft-deleted principals.
pub trait PrincipalStore: Clone + Send + Sync + 'static {
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Principal, PrincipalStoreError>> + Send;

    fn find_by_id(&self, id: i64)
    -> impl Future<Output = Result<Principal, PrincipalStoreError>> + Send;

    /// Insert a principal. Reports `UniquenessViolation` when a live principal
    /// already owns the email.
    fn insert(
        &self,
        principal: NewPrincipal,
    ) -> impl Future<Output = Result<Principal, PrincipalStoreError>> + Send;

    fn update_password(
        &self,
        id: i64,
        password_hash: &str,
    ) -> impl Future<Output = Result<(), PrincipalStoreError>> + Send;

    /// Set the soft-delete marker. The row is retained.
    fn soft_delete(&self, id: i64) -> impl Future<Output = Result<(), PrincipalStoreError>> + Send;
}

/// Errors reported by a principal store.
#[derive(Debug)]
pub enum PrincipalStoreError {
    NotFound,
    UniquenessViolation,
    /// Backend unreachable or failed
    Unavailable(String),
}

impl std::fmt::Display for PrincipalStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrincipalStoreError::NotFound => write!(f, "Principal not found"),
            PrincipalStoreError::UniquenessViolation => write!(f, "Email already in use"),
            PrincipalStoreError::Unavailable(e) => write!(f, "Principal store unavailable: {}", e),
        }
    }
}

impl std::error::Error for PrincipalStoreError {}

/// Normalize an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
