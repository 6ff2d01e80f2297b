//! Registration, login and session validation.
//!
//! The service owns no per-call state: it holds cloneable handles to the
//! principal and session stores plus the injected configuration, and is shared
//! across all requests.
//!
//! A principal has at most one live session. Login writes the identifiers of
//! the freshly minted pair into the session store with a short idle TTL,
//! overwriting whatever was there; validation requires the presented token's
//! identifier to match the stored one and the principal to still exist.

mod errors;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, error, info, warn};

use crate::jwt::{TokenIssuer, TokenPurpose, TokenSettings};
use crate::password::{CredentialHasher, HashCost, PasswordError};
use crate::principal::{
    NewPrincipal, Principal, PrincipalStore, PrincipalStoreError, normalize_email,
};
use crate::session::{SessionRecord, SessionStore, SessionStoreError};

pub use errors::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Default idle window of a session record: 10 minutes
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(10 * 60);

/// Default bound on every store call: 2 seconds
pub const STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration injected into the service at construction.
#[derive(Clone)]
pub struct AuthConfig {
    pub tokens: TokenSettings,
    pub hash_cost: HashCost,
    /// Session record TTL, extended on every successful validation
    pub session_idle_ttl: Duration,
    /// Timeout applied to each store call
    pub store_timeout: Duration,
    /// Client ID mixed into secrets derived for external identities.
    /// External login is refused when unset. The derivation is keyed with the
    /// refresh secret.
    pub external_client_id: Option<String>,
}

impl AuthConfig {
    pub fn new(tokens: TokenSettings) -> Self {
        Self {
            tokens,
            hash_cost: HashCost::default(),
            session_idle_ttl: SESSION_IDLE_TTL,
            store_timeout: STORE_TIMEOUT,
            external_client_id: None,
        }
    }
}

/// A registration candidate carrying the plaintext password.
#[derive(Clone)]
pub struct Registration {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// An identity vouched for by an external identity provider.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    /// Provider-side account identifier
    pub subject: String,
    pub email: String,
    pub name: String,
}

/// Token pair handed out by login and refresh.
#[derive(Debug, Clone)]
pub struct LoginTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry (Unix seconds)
    pub access_expires_at: u64,
    /// Refresh token expiry (Unix seconds)
    pub refresh_expires_at: u64,
}

#[derive(Clone)]
pub struct AuthService<P, S> {
    principals: P,
    sessions: S,
    hasher: CredentialHasher,
    tokens: TokenIssuer,
    /// Digest of a random password, verified against on unknown-email logins
    dummy_digest: Arc<str>,
    idle_ttl: Duration,
    store_timeout: Duration,
    external_client_id: Option<Arc<str>>,
    external_key: Arc<[u8]>,
}

impl<P: PrincipalStore, S: SessionStore> AuthService<P, S> {
    pub fn new(principals: P, sessions: S, config: &AuthConfig) -> Result<Self, PasswordError> {
        let hasher = CredentialHasher::new(config.hash_cost)?;
        let dummy_digest = hasher.hash(&uuid::Uuid::new_v4().to_string())?;

        Ok(Self {
            principals,
            sessions,
            hasher,
            tokens: TokenIssuer::new(&config.tokens),
            dummy_digest: Arc::from(dummy_digest),
            idle_ttl: config.session_idle_ttl,
            store_timeout: config.store_timeout,
            external_client_id: config.external_client_id.as_deref().map(Arc::from),
            external_key: Arc::from(config.tokens.refresh_secret.as_slice()),
        })
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn principals(&self) -> &P {
        &self.principals
    }

    pub fn sessions(&self) -> &S {
        &self.sessions
    }

    pub fn session_idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    async fn with_principals<T>(
        &self,
        call: impl Future<Output = Result<T, PrincipalStoreError>>,
    ) -> Result<T, PrincipalStoreError> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .unwrap_or_else(|_| Err(PrincipalStoreError::Unavailable("timed out".to_string())))
    }

    async fn with_sessions<T>(
        &self,
        call: impl Future<Output = Result<T, SessionStoreError>>,
    ) -> Result<T, SessionStoreError> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .unwrap_or_else(|_| Err(SessionStoreError::Unavailable("timed out".to_string())))
    }

    async fn hash_password(&self, plaintext: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_string();

        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| {
                error!(error = %e, "Password hashing task failed");
                AuthError::CredentialHashing
            })?
            .map_err(|e| {
                error!(error = %e, "Failed to hash password");
                AuthError::CredentialHashing
            })
    }

    async fn verify_password(&self, plaintext: &str, digest: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_string();
        let digest = digest.to_string();

        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &digest))
            .await
            .map_err(|e| {
                error!(error = %e, "Password verification task failed");
                AuthError::CredentialHashing
            })
    }

    /// Create a principal from a registration candidate.
    ///
    /// A uniqueness violation at insert time (a concurrent registration won the
    /// race past the existence check) is reported as `AlreadyExists`.
    pub async fn register(&self, candidate: Registration) -> Result<Principal, AuthError> {
        let email = normalize_email(&candidate.email);

        match self
            .with_principals(self.principals.find_by_email(&email))
            .await
        {
            Ok(_) => return Err(AuthError::AlreadyExists),
            Err(PrincipalStoreError::NotFound) => {}
            Err(e) => {
                error!(error = %e, "Failed to check for existing account");
                return Err(AuthError::StoreUnavailable);
            }
        }

        let password_hash = self.hash_password(&candidate.password).await?;

        let principal = self
            .with_principals(self.principals.insert(NewPrincipal {
                email,
                name: candidate.name,
                password_hash,
            }))
            .await
            .map_err(|e| match e {
                PrincipalStoreError::UniquenessViolation => AuthError::AlreadyExists,
                e => {
                    error!(error = %e, "Failed to insert account");
                    AuthError::PersistenceFailed
                }
            })?;

        info!(principal_id = principal.id, "Account registered");
        Ok(principal)
    }

    /// Check credentials and start a new session, replacing any existing one.
    ///
    /// An unknown email costs the same password verification as a wrong
    /// password.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginTokens, AuthError> {
        let email = normalize_email(email);

        let principal = match self
            .with_principals(self.principals.find_by_email(&email))
            .await
        {
            Ok(principal) => principal,
            Err(PrincipalStoreError::NotFound) => {
                debug!("Login for unknown email");
                self.verify_password(password, &self.dummy_digest).await?;
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                error!(error = %e, "Failed to look up account for login");
                return Err(AuthError::StoreUnavailable);
            }
        };

        if !self
            .verify_password(password, &principal.password_hash)
            .await?
        {
            debug!(principal_id = principal.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        self.start_session(&principal).await
    }

    /// Mint a token pair and record its identifiers as the principal's session.
    /// Tokens are only returned once the record is written.
    async fn start_session(&self, principal: &Principal) -> Result<LoginTokens, AuthError> {
        let issue = |purpose| {
            self.tokens.issue(principal, purpose).map_err(|e| {
                error!(error = %e, "Failed to issue token");
                AuthError::TokenSigning
            })
        };
        let access = issue(TokenPurpose::Access)?;
        let refresh = issue(TokenPurpose::Refresh)?;

        let record = SessionRecord {
            access_session_id: access.session_id,
            refresh_session_id: refresh.session_id,
        };

        self.with_sessions(self.sessions.put(principal.id, &record, self.idle_ttl))
            .await
            .map_err(|e| {
                error!(principal_id = principal.id, error = %e, "Failed to store session");
                AuthError::StoreUnavailable
            })?;

        info!(principal_id = principal.id, "Session started");

        Ok(LoginTokens {
            access_token: access.token,
            refresh_token: refresh.token,
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
        })
    }

    /// Validate a session identifier taken from a verified token.
    ///
    /// The session record and the principal are fetched concurrently; both
    /// must check out. The first failure ends the wait and drops the other
    /// lookup.
    pub async fn validate_jwt(
        &self,
        session_id: &str,
        principal_id: i64,
        purpose: TokenPurpose,
    ) -> Result<Principal, AuthError> {
        let session_check = async {
            let record = self
                .with_sessions(self.sessions.get(principal_id))
                .await
                .map_err(|e| match e {
                    SessionStoreError::NotFound => {
                        debug!(principal_id, "No live session record");
                        AuthError::SessionInvalid
                    }
                    SessionStoreError::Unavailable(e) => {
                        error!(principal_id, error = %e, "Failed to read session record");
                        AuthError::StoreUnavailable
                    }
                })?;

            if record.session_id(purpose) != session_id {
                debug!(principal_id, ?purpose, "Session identifier mismatch");
                return Err(AuthError::SessionInvalid);
            }
            Ok(())
        };

        let principal_check = async {
            self.with_principals(self.principals.find_by_id(principal_id))
                .await
                .map_err(|e| match e {
                    PrincipalStoreError::Unavailable(e) => {
                        error!(principal_id, error = %e, "Failed to load principal");
                        AuthError::StoreUnavailable
                    }
                    _ => {
                        debug!(principal_id, "Principal no longer exists");
                        AuthError::PrincipalInvalid
                    }
                })
        };

        let ((), principal) = tokio::try_join!(session_check, principal_check)?;
        Ok(principal)
    }

    /// Slide the session record's expiry forward without waiting for it.
    ///
    /// Runs on its own task bounded by the store timeout; failure only means
    /// the session expires sooner and is logged, never returned.
    pub fn extend_session(&self, principal_id: i64) -> tokio::task::JoinHandle<()> {
        let sessions = self.sessions.clone();
        let ttl = self.idle_ttl;
        let timeout = self.store_timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, sessions.extend(principal_id, ttl)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(principal_id, error = %e, "Failed to extend session"),
                Err(_) => warn!(principal_id, "Timed out extending session"),
            }
        })
    }

    /// Exchange a refresh token for a new pair, invalidating the old one.
    pub async fn refresh(&self, refresh_token: &str) -> Result<LoginTokens, AuthError> {
        let claims = self
            .tokens
            .verify(refresh_token, TokenPurpose::Refresh)
            .map_err(|e| {
                debug!(error = %e, "Rejected refresh token");
                AuthError::SessionInvalid
            })?;

        let principal = self
            .validate_jwt(&claims.uid, claims.id, TokenPurpose::Refresh)
            .await?;

        self.start_session(&principal).await
    }

    /// Revoke the principal's session immediately.
    pub async fn logout(&self, principal_id: i64) -> Result<(), AuthError> {
        let existed = self
            .with_sessions(self.sessions.remove(principal_id))
            .await
            .map_err(|e| {
                error!(principal_id, error = %e, "Failed to remove session");
                AuthError::StoreUnavailable
            })?;

        if existed {
            info!(principal_id, "Session revoked");
        }
        Ok(())
    }

    /// Log in an identity vouched for by an external provider, registering it
    /// on first sight.
    ///
    /// The account's password is an HMAC over the provider subject, the email
    /// and the configured client ID, keyed with a server secret. An account
    /// registered with a regular password cannot be taken over through this
    /// path, and the derived password cannot be computed from public values.
    pub async fn login_external(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<LoginTokens, AuthError> {
        let Some(client_id) = self.external_client_id.as_deref() else {
            warn!("External login attempted but no client ID is configured");
            return Err(AuthError::InvalidCredentials);
        };

        let email = normalize_email(&identity.email);
        let secret = external_secret(&self.external_key, &identity.subject, &email, client_id)?;

        match self
            .register(Registration {
                email: email.clone(),
                name: identity.name.clone(),
                password: secret.clone(),
            })
            .await
        {
            Ok(_) | Err(AuthError::AlreadyExists) => {}
            Err(e) => return Err(e),
        }

        self.login(&email, &secret).await
    }

    /// Replace the password after checking the current one. Revokes the
    /// session so the pair issued under the old password stops validating.
    pub async fn change_password(
        &self,
        principal_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let principal = self
            .with_principals(self.principals.find_by_id(principal_id))
            .await
            .map_err(|e| match e {
                PrincipalStoreError::Unavailable(e) => {
                    error!(principal_id, error = %e, "Failed to load principal");
                    AuthError::StoreUnavailable
                }
                _ => AuthError::PrincipalInvalid,
            })?;

        if !self
            .verify_password(current_password, &principal.password_hash)
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = self.hash_password(new_password).await?;

        self.with_principals(self.principals.update_password(principal_id, &password_hash))
            .await
            .map_err(|e| match e {
                PrincipalStoreError::NotFound => AuthError::PrincipalInvalid,
                e => {
                    error!(principal_id, error = %e, "Failed to update password");
                    AuthError::PersistenceFailed
                }
            })?;

        info!(principal_id, "Password changed");
        self.logout(principal_id).await
    }

    /// Soft-delete the principal and revoke its session.
    pub async fn delete_account(&self, principal_id: i64) -> Result<(), AuthError> {
        self.with_principals(self.principals.soft_delete(principal_id))
            .await
            .map_err(|e| match e {
                PrincipalStoreError::NotFound => AuthError::PrincipalInvalid,
                e => {
                    error!(principal_id, error = %e, "Failed to delete account");
                    AuthError::PersistenceFailed
                }
            })?;

        info!(principal_id, "Account deleted");

        // Validation already fails on the missing principal
        if let Err(e) = self.logout(principal_id).await {
            warn!(principal_id, error = %e, "Failed to revoke session of deleted account");
        }
        Ok(())
    }
}

/// Hex-encoded HMAC-SHA256 of the identity fields, each NUL-terminated so
/// field boundaries cannot shift.
fn external_secret(
    key: &[u8],
    subject: &str,
    email: &str,
    client_id: &str,
) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| {
        error!(error = %e, "Invalid external login key");
        AuthError::CredentialHashing
    })?;
    for field in [subject, email, client_id] {
        mac.update(field.as_bytes());
        mac.update(&[0]);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}
