//! Error taxonomy of the authentication core.

/// Errors returned by [`AuthService`](super::AuthService) operations.
///
/// Each variant is a kind, not a message: backend error text is logged where
/// it occurs and never carried outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// A live principal already owns the email
    AlreadyExists,
    /// Unknown email or wrong password; the two are deliberately merged
    InvalidCredentials,
    /// No session record, expired record, or session identifier mismatch
    SessionInvalid,
    /// Principal vanished after token issuance
    PrincipalInvalid,
    /// A backing store was unreachable or timed out
    StoreUnavailable,
    /// Insert/update failed for a reason other than uniqueness
    PersistenceFailed,
    /// Password hashing failed
    CredentialHashing,
    /// Token signing failed
    TokenSigning,
}

impl AuthError {
    /// Whether the failure was caused by the caller rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AuthError::AlreadyExists
                | AuthError::InvalidCredentials
                | AuthError::SessionInvalid
                | AuthError::PrincipalInvalid
        )
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::AlreadyExists => write!(f, "Account already exists"),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::SessionInvalid => write!(f, "Session is not valid"),
            AuthError::PrincipalInvalid => write!(f, "Account is not valid"),
            AuthError::StoreUnavailable => write!(f, "Store unavailable"),
            AuthError::PersistenceFailed => write!(f, "Failed to persist account"),
            AuthError::CredentialHashing => write!(f, "Failed to hash credentials"),
            AuthError::TokenSigning => write!(f, "Failed to sign token"),
        }
    }
}

impl std::error::Error for AuthError {}
