//! Password hashing.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use thiserror::Error;

/// Errors that can occur while hashing or verifying passwords.
#[derive(Debug, Error)]
pub enum HashError {
    /// The hasher failed to produce a digest.
    #[error("password hashing failed: {0}")]
    Hash(String),

    /// The stored digest is not a valid PHC string.
    #[error("stored password hash is malformed")]
    MalformedHash,

    /// The Argon2 parameters are out of range.
    #[error("invalid argon2 parameters: {0}")]
    InvalidParams(String),
}

/// Turns plaintext passwords into digests and checks them later.
pub trait PasswordHashing: Send + Sync {
    /// Hash a plaintext password into a self-describing digest.
    ///
    /// # Errors
    ///
    /// Returns `HashError::Hash` if the digest cannot be produced.
    fn hash(&self, plaintext: &str) -> Result<String, HashError>;

    /// Returns true if `plaintext` matches `digest`.
    ///
    /// # Errors
    ///
    /// Returns `HashError::MalformedHash` if `digest` cannot be parsed.
    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, HashError>;
}

/// Argon2id hasher producing PHC strings.
#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    /// Hasher with the crate's default (OWASP) parameters.
    ///
    /// Unit tests get cheap parameters so hashing stays fast.
    #[must_use]
    pub fn new() -> Self {
        #[cfg(test)]
        {
            Self::cheap()
        }
        #[cfg(not(test))]
        {
            Self {
                argon2: Argon2::default(),
            }
        }
    }

    /// Hasher with explicit cost parameters.
    ///
    /// # Errors
    ///
    /// Returns `HashError::InvalidParams` if Argon2 rejects the parameters.
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, HashError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| HashError::InvalidParams(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    #[cfg(test)]
    fn cheap() -> Self {
        Self::with_params(1024, 1, 1).unwrap_or_else(|_| Self {
            argon2: Argon2::default(),
        })
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHashing for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| HashError::Hash(e.to_string()))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(digest).map_err(|_| HashError::MalformedHash)?;
        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HashError::Hash(e.to_string())),
        }
    }
}
