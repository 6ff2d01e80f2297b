//! JWT token issuance and verification.
//!
//! Access and refresh tokens carry the same claim shape but are signed with
//! different secrets, so a token minted for one purpose never verifies as the
//! other. Every issued token carries a fresh session identifier (`uid`) that
//! binds it to the principal's session record.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::principal::Principal;

/// Token purpose, selecting the secret and lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    /// Short-lived token presented on protected requests
    Access,
    /// Long-lived token exchanged for a new pair
    Refresh,
}

/// Signed claim set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Principal ID
    pub id: i64,
    /// Display name
    pub name: String,
    /// Session identifier, minted per issuance
    pub uid: String,
    /// Token purpose
    #[serde(rename = "typ")]
    pub purpose: TokenPurpose,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Default access token lifetime: 2 hours
pub const ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(2 * 60 * 60);

/// Default refresh token lifetime: 48 hours
pub const REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(48 * 60 * 60);

/// Secrets and lifetimes for both token purposes.
#[derive(Clone)]
pub struct TokenSettings {
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
    pub access_lifetime: Duration,
    pub refresh_lifetime: Duration,
}

impl TokenSettings {
    /// Settings with the default lifetimes.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self {
            access_secret: access_secret.to_vec(),
            refresh_secret: refresh_secret.to_vec(),
            access_lifetime: ACCESS_TOKEN_LIFETIME,
            refresh_lifetime: REFRESH_TOKEN_LIFETIME,
        }
    }
}

/// HS256 key pair derived from one secret.
#[derive(Clone)]
pub struct SigningKey {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningKey {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Sign a claim set.
    pub fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        jsonwebtoken::encode(&Header::default(), claims, &self.encoding_key)
            .map_err(JwtError::Encoding)
    }

    /// Verify signature and expiry, returning the claim set.
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(JwtError::Decoding)
    }
}

/// A freshly minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Session identifier embedded in the claims
    pub session_id: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

/// Mints and verifies access/refresh tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    access: SigningKey,
    refresh: SigningKey,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(settings: &TokenSettings) -> Self {
        Self {
            access: SigningKey::new(&settings.access_secret),
            refresh: SigningKey::new(&settings.refresh_secret),
            access_lifetime: settings.access_lifetime,
            refresh_lifetime: settings.refresh_lifetime,
        }
    }

    fn key(&self, purpose: TokenPurpose) -> &SigningKey {
        match purpose {
            TokenPurpose::Access => &self.access,
            TokenPurpose::Refresh => &self.refresh,
        }
    }

    /// Lifetime applied to tokens of the given purpose.
    pub fn lifetime(&self, purpose: TokenPurpose) -> Duration {
        match purpose {
            TokenPurpose::Access => self.access_lifetime,
            TokenPurpose::Refresh => self.refresh_lifetime,
        }
    }

    /// Issue a token for a principal with a new random session identifier.
    pub fn issue(
        &self,
        principal: &Principal,
        purpose: TokenPurpose,
    ) -> Result<IssuedToken, JwtError> {
        let now = unix_now()?;
        let exp = now + self.lifetime(purpose).as_secs();
        let session_id = uuid::Uuid::new_v4().to_string();

        let claims = Claims {
            id: principal.id,
            name: principal.name.clone(),
            uid: session_id.clone(),
            purpose,
            iat: now,
            exp,
        };

        let token = self.key(purpose).sign(&claims)?;

        Ok(IssuedToken {
            token,
            session_id,
            expires_at: exp,
        })
    }

    /// Verify a token against the secret for `purpose`.
    pub fn verify(&self, token: &str, purpose: TokenPurpose) -> Result<Claims, JwtError> {
        let claims = self.key(purpose).verify(token)?;

        if claims.purpose != purpose {
            return Err(JwtError::WrongTokenType);
        }

        Ok(claims)
    }
}

fn unix_now() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}
