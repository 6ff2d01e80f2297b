//! Password hashing with Argon2id.

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};

/// Work factor for password hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes over memory
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for HashCost {
    /// OWASP minimum for Argon2id: m=19456 KiB, t=2, p=1.
    fn default() -> Self {
        Self {
            memory_kib: 19456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// One-way, salted password hasher.
#[derive(Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    pub fn new(cost: HashCost) -> Result<Self, PasswordError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(PasswordError::InvalidCost)?;
        Ok(Self { params })
    }

    /// Hash a plaintext password into a PHC string with a fresh random salt.
    pub fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(PasswordError::Hashing)
    }

    /// Check a plaintext password against a stored digest.
    ///
    /// Parameters are read from the digest itself, so hashes produced under an
    /// older cost still verify. A digest that cannot be parsed never matches.
    pub fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!(error = %e, "Stored password hash is malformed");
                return false;
            }
        };
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Errors that can occur while hashing.
#[derive(Debug)]
pub enum PasswordError {
    /// Cost parameters rejected by Argon2
    InvalidCost(argon2::Error),
    /// Hash computation failed
    Hashing(argon2::password_hash::Error),
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordError::InvalidCost(e) => write!(f, "Invalid hash cost: {}", e),
            PasswordError::Hashing(e) => write!(f, "Failed to hash password: {}", e),
        }
    }
}

impl std::error::Error for PasswordError {}

#[cfg(test)]
pub(crate) fn test_hasher() -> CredentialHasher {
    CredentialHasher::new(HashCost {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    })
    .unwrap()
}
